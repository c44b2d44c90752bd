mod detect;
mod encode;
mod init;
pub mod server;

pub use detect::*;
pub use encode::*;
pub use init::*;
pub use server::*;

use clap::ValueEnum;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
