use std::path::{Path, PathBuf};

use thiserror::Error;

pub const USAGE: &str = "Usage:
    vnet router <lnx-file> -r <route-table-file> -a <arp-cache-file>
    vnet switch <lnx-file>";

/// What the binary was asked to run.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Invocation {
    Router {
        link_file: PathBuf,
        route_table: PathBuf,
        arp_cache: PathBuf,
    },
    Switch {
        link_file: PathBuf,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseInvocationError {
    #[error("missing device kind (router or switch)")]
    MissingKind,
    #[error("unknown device kind {0:?}")]
    UnknownKind(String),
    #[error("missing link file")]
    MissingLinkFile,
    #[error("flag {0} needs a value")]
    MissingFlagValue(&'static str),
    #[error("flag {0} given more than once")]
    RepeatedFlag(&'static str),
    #[error("missing route table file (-r)")]
    MissingRouteTable,
    #[error("missing ARP cache file (-a)")]
    MissingArpCache,
    #[error("unexpected argument {0:?}")]
    UnexpectedArg(String),
}

impl Invocation {
    pub fn link_file(&self) -> &Path {
        match self {
            Invocation::Router { link_file, .. } | Invocation::Switch { link_file } => link_file,
        }
    }

    /// Parse arguments, excluding the program name.
    pub fn try_parse<I>(args: I) -> Result<Invocation, ParseInvocationError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let kind = args.next().ok_or(ParseInvocationError::MissingKind)?;
        let link_file: PathBuf = args
            .next()
            .ok_or(ParseInvocationError::MissingLinkFile)?
            .into();

        match kind.as_str() {
            "router" => {
                let mut route_table = None;
                let mut arp_cache = None;

                while let Some(arg) = args.next() {
                    let (flag, slot) = match arg.as_str() {
                        "-r" => ("-r", &mut route_table),
                        "-a" => ("-a", &mut arp_cache),
                        _ => return Err(ParseInvocationError::UnexpectedArg(arg)),
                    };
                    let value = args
                        .next()
                        .ok_or(ParseInvocationError::MissingFlagValue(flag))?;
                    if slot.replace(PathBuf::from(value)).is_some() {
                        return Err(ParseInvocationError::RepeatedFlag(flag));
                    }
                }

                Ok(Invocation::Router {
                    link_file,
                    route_table: route_table.ok_or(ParseInvocationError::MissingRouteTable)?,
                    arp_cache: arp_cache.ok_or(ParseInvocationError::MissingArpCache)?,
                })
            }
            "switch" => match args.next() {
                Some(extra) => Err(ParseInvocationError::UnexpectedArg(extra)),
                None => Ok(Invocation::Switch { link_file }),
            },
            _ => Err(ParseInvocationError::UnknownKind(kind)),
        }
    }
}

impl TryFrom<std::env::Args> for Invocation {
    type Error = ParseInvocationError;

    fn try_from(args: std::env::Args) -> Result<Self, Self::Error> {
        Invocation::try_parse(args.skip(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Invocation, ParseInvocationError> {
        Invocation::try_parse(line.split_whitespace().map(String::from))
    }

    #[test]
    fn parse_router_invocation() {
        let expected = Invocation::Router {
            link_file: "r1.lnx".into(),
            route_table: "r1.rt".into(),
            arp_cache: "r1.arp".into(),
        };
        assert_eq!(parse("router r1.lnx -r r1.rt -a r1.arp").unwrap(), expected);
        assert_eq!(parse("router r1.lnx -a r1.arp -r r1.rt").unwrap(), expected);
        assert_eq!(expected.link_file(), Path::new("r1.lnx"));
    }

    #[test]
    fn parse_switch_invocation() {
        assert_eq!(
            parse("switch s1.lnx").unwrap(),
            Invocation::Switch {
                link_file: "s1.lnx".into()
            }
        );
    }

    #[test]
    fn reject_bad_invocations() {
        assert_eq!(parse("").unwrap_err(), ParseInvocationError::MissingKind);
        assert_eq!(parse("router").unwrap_err(), ParseInvocationError::MissingLinkFile);
        assert_eq!(
            parse("hub h.lnx").unwrap_err(),
            ParseInvocationError::UnknownKind("hub".into())
        );
        assert_eq!(
            parse("router r.lnx -r r.rt").unwrap_err(),
            ParseInvocationError::MissingArpCache
        );
        assert_eq!(
            parse("router r.lnx -a r.arp").unwrap_err(),
            ParseInvocationError::MissingRouteTable
        );
        assert_eq!(
            parse("router r.lnx -r r.rt -a").unwrap_err(),
            ParseInvocationError::MissingFlagValue("-a")
        );
        assert_eq!(
            parse("router r.lnx -r a.rt -r b.rt -a r.arp").unwrap_err(),
            ParseInvocationError::RepeatedFlag("-r")
        );
        assert_eq!(
            parse("switch s.lnx -r s.rt").unwrap_err(),
            ParseInvocationError::UnexpectedArg("-r".into())
        );
    }
}
