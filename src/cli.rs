use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "octoblocks",
    about = "Generate octo sequence source from a block editor workspace document."
)]
pub struct Args {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = 2, help = "Spaces per indentation level.")]
    pub indent: usize,

    #[arg(
        long,
        value_name = "TEMPLATE",
        help = "Emit this before every statement; %1 becomes the quoted block id."
    )]
    pub statement_prefix: Option<String>,

    #[arg(long, help = "Print the global variables and their attributes.")]
    pub list_variables: bool,

    #[arg(short, long, help = "Log reshapes, rebinding and generation details.")]
    pub verbose: bool,
}
