use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cloudfold",
    version,
    about = "Browse and edit a cloudfold file store from the terminal"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// API base URL
    #[arg(long, env = "CLOUDFOLD_URL", global = true)]
    pub url: Option<String>,

    /// Bearer token
    #[arg(long, env = "CLOUDFOLD_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List a folder (root when no id is given)
    Ls(LsArgs),
    /// Show the breadcrumb path of a folder
    Path(PathArgs),
    /// Show storage usage
    Quota,
    /// Upload a local file
    Upload(UploadArgs),
    /// Create a folder
    Mkdir(MkdirArgs),
    /// Rename a file or folder
    Rename(RenameArgs),
    /// Delete a file or folder
    Rm(RmArgs),
    /// Download a file, or show its preview
    Download(DownloadArgs),
    /// Download a folder as a zip archive
    Zip(ZipArgs),
    Version,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Folder id
    pub folder: Option<i64>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Folder id
    pub folder: i64,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Target folder id (root when omitted)
    #[arg(long)]
    pub parent: Option<i64>,

    /// Name on the server (defaults to the local file name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct MkdirArgs {
    pub name: String,

    /// Parent folder id (root when omitted)
    #[arg(long)]
    pub parent: Option<i64>,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// File or folder id
    pub id: i64,

    pub new_name: String,
}

#[derive(Args, Debug)]
pub struct RmArgs {
    /// File or folder id
    pub id: i64,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// File id
    pub id: i64,

    /// Output path (defaults to the server's file name)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Fetch the preview rendition instead
    #[arg(long)]
    pub preview: bool,
}

#[derive(Args, Debug)]
pub struct ZipArgs {
    /// Folder id
    pub id: i64,

    /// Output path (defaults to the server's archive name)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
