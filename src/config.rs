use clap::Parser;
use clap_num::maybe_hex;
use lazy_static::lazy_static;

#[derive(Parser, Debug)]
#[command(author,version,about,long_about=None)]
pub struct Args {
    /// Assembly (.asm, .s) file to assemble and run
    pub file: String,

    /// Stop execution when IP reaches this offset (hex ok with '0x')
    #[arg(long,value_parser=maybe_hex::<u16>)]
    pub break_at: Option<u16>,

    /// Remove lines that emit no machine code from the program listing
    #[arg(short, long)]
    pub code_only: bool,

    /// Dump the program listing (offsets, machine code, source) to stdout
    #[arg(short, long)]
    pub list: bool,

    /// Run the assembled program and evaluate any test criteria
    #[arg(short, long)]
    pub run: bool,

    /// Maximum number of instructions a single run may execute
    #[arg(long, default_value_t = 1_000_000_u64)]
    pub step_limit: u64,

    /// Trace each machine instruction as it is executed
    #[arg(short, long)]
    pub trace: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

lazy_static! {
    pub static ref ARGS: Args = if cfg!(test) {
        // manually set parameters for running tests
        Args::parse_from(["test", "test", "--run"])
    } else {
        Args::parse()
    };
}

pub fn init() {}
pub fn run() -> bool { ARGS.run }
pub fn help_humans() -> bool { ARGS.trace || ARGS.verbose }
