use super::super::args::*;
use super::context::open_store;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    if let Command::Version = cli.cmd {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let store = open_store(&cli.global)?;
    let code = match cli.cmd {
        Command::Ls(args) => super::browse::ls(&store, args).await,
        Command::Path(args) => super::browse::path(&store, args).await,
        Command::Quota => super::browse::quota(&store).await,
        Command::Upload(args) => super::edit::upload(&store, args).await,
        Command::Mkdir(args) => super::edit::mkdir(&store, args).await,
        Command::Rename(args) => super::edit::rename(&store, args).await,
        Command::Rm(args) => super::edit::rm(&store, args).await,
        Command::Download(args) => super::transfer::download(&store, args).await,
        Command::Zip(args) => super::transfer::zip(&store, args).await,
        Command::Version => Ok(SUCCESS),
    };
    store.close();
    code
}
