use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "captcha-locator")]
#[command(about = "Locates CAPTCHA images on web pages, captures them and decodes their text")]
#[command(version)]
pub struct Args {
    /// JSON configuration file (every section optional)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// WebDriver endpoint, overrides the config file and WEBDRIVER_URL
    #[arg(long, global = true)]
    pub webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    pub headless: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture the CAPTCHA on each page without decoding it
    Locate {
        /// Pages to visit, in order
        urls: Vec<String>,

        /// File with one URL per line (blank lines and # comments ignored)
        #[arg(long)]
        urls_file: Option<PathBuf>,
    },

    /// Capture and decode the CAPTCHA on one page
    Solve {
        url: String,

        /// Type the decoded answer into the page and submit it
        #[arg(long)]
        submit: bool,
    },

    /// Decode an image file
    Decode { image: PathBuf },

    /// List recorded captures
    Captures,

    /// Describe the loaded model and alphabet
    ModelInfo,
}
