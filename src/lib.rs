pub mod cli;
pub mod cmdline;
pub mod device;
#[cfg(test)]
mod fixture;
pub mod iface;
pub mod link;
pub mod node;
pub mod packet;
mod repl;
pub mod router;
pub mod switch;

pub use cmdline::Invocation;
pub use link::Args;
pub use repl::Exit;
