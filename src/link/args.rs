use std::{
    fmt::Display,
    fs::File,
    io::{BufRead, BufReader},
    net::Ipv4Addr,
    path::Path,
};

use thiserror::Error;

use super::{LinkDefinition, ParseLinkError};

/// Contents of a link file; used to establish a device's interfaces.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Args {
    /// The UDP port where this device listens.
    pub host_port: u16,
    /// The device's interfaces, in the order they appear in the file.
    pub links: Vec<LinkDefinition>,
}

#[derive(Error, Debug)]
pub enum ParseArgsError {
    #[error("link file is empty")]
    MissingFirstLine,
    #[error("first line has no host")]
    NoHost,
    #[error("first line has no port")]
    NoPort,
    #[error("link file defines no interfaces")]
    NoLinks,
    #[error("malformed port on first line")]
    MalformedPort,
    #[error("line {0}: {1}")]
    MalformedLink(usize, ParseLinkError),
    #[error("interface {0} is defined twice")]
    DuplicateInterface(String),
    #[error("failed to read link file: {0}")]
    ReadLineError(std::io::Error),
    #[error("failed to open link file: {0}")]
    OpenLinkFileError(std::io::Error),
}

impl Args {
    pub fn parse_from_path<P: AsRef<Path>>(path: P) -> Result<Args, ParseArgsError> {
        let br = BufReader::new(File::open(path).map_err(ParseArgsError::OpenLinkFileError)?);
        Args::try_parse(br)
    }

    pub fn try_parse<B>(reader: B) -> Result<Args, ParseArgsError>
    where
        B: BufRead,
    {
        let mut lines = reader.lines();
        let host_ip_port = lines
            .next()
            .ok_or(ParseArgsError::MissingFirstLine)?
            .map_err(ParseArgsError::ReadLineError)?;

        let mut ip_port = host_ip_port.split_whitespace();
        // ignored: assume localhost
        let _ip = ip_port.next().ok_or(ParseArgsError::NoHost)?;
        let port = ip_port
            .next()
            .ok_or(ParseArgsError::NoPort)?
            .parse::<u16>()
            .map_err(|_| ParseArgsError::MalformedPort)?;

        let mut links: Vec<LinkDefinition> = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let raw_link = line.map_err(ParseArgsError::ReadLineError)?;
            if raw_link.trim().is_empty() {
                continue;
            }
            let link = LinkDefinition::try_parse(raw_link.as_str())
                .map_err(|e| ParseArgsError::MalformedLink(line_no + 2, e))?;
            if links.iter().any(|l| l.name == link.name) {
                return Err(ParseArgsError::DuplicateInterface(link.name));
            }
            links.push(link);
        }

        if links.is_empty() {
            return Err(ParseArgsError::NoLinks);
        }

        Ok(Args {
            host_port: port,
            links,
        })
    }

    pub fn get_my_interface_ips(&self) -> Vec<Ipv4Addr> {
        self.links.iter().map(|l| l.ip).collect()
    }
}

impl Display for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Running on port {}", self.host_port)?;
        for link in self.links.iter() {
            write!(f, "\n{}:{}", link.name, link.dest_port)?;
        }
        Ok(())
    }
}
