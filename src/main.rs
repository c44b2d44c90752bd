use clap::Parser;
use facesearch::Opts;
use facesearch::cli::SubCommandExtend;
use facesearch::config::SubCommand;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Init(config) => config.run(&opts).await,
        SubCommand::Detect(config) => config.run(&opts).await,
        SubCommand::Encode(config) => config.run(&opts).await,
    }
}
