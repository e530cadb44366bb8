use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "mendexport",
    version,
    about = "Export Mendeley annotations with outline-aware chapter placement"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Export(ExportArgs),
    Toc(TocArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Include {
    Highlights,
    Notes,
    Both,
}

impl Include {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highlights => "highlights",
            Self::Notes => "notes",
            Self::Both => "annotations",
        }
    }

    pub fn highlights(self) -> bool {
        matches!(self, Self::Highlights | Self::Both)
    }

    pub fn notes(self) -> bool {
        matches!(self, Self::Notes | Self::Both)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Path to the Mendeley desktop sqlite database
    #[arg(long)]
    pub db_path: PathBuf,

    #[arg(long, default_value = "exports")]
    pub output_dir: PathBuf,

    /// Restrict the export to one Mendeley folder
    #[arg(long)]
    pub folder: Option<String>,

    #[arg(long, value_enum, default_value_t = Include::Both)]
    pub include: Include,

    /// Write one report file per document instead of a combined file
    #[arg(long, default_value_t = false)]
    pub separate: bool,

    /// Additionally regroup annotations by tag across documents
    #[arg(long, default_value_t = false)]
    pub by_tags: bool,

    /// Additionally group each document's annotations by highlight color
    #[arg(long, default_value_t = false)]
    pub by_colors: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TocArgs {
    /// Path to a PDF file
    pub pdf_path: PathBuf,

    /// Padding character between title and page number
    #[arg(long, default_value = ".")]
    pub padding: char,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub db_path: PathBuf,

    #[arg(long, default_value = "exports")]
    pub output_dir: PathBuf,
}
