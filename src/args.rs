use clap::Parser;

/// This program measures the distances from census units to polling places.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the analysis: the census and polling place sources,
    /// the output files and the rules. See the manual of the polling_proximity crate.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference summary in JSON format. If provided, pollprox will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the analysis will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified in the config file.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// If passed as an argument, the distances are computed again even if a cache file exists.
    /// The cache file is then overwritten.
    #[clap(long, takes_value = false)]
    pub recompute: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
