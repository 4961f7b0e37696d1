use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::VectorBackend;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml and local collections.
    /// Defaults to $APREP_BASE_PATH or ~/.local/share/aprep
    #[clap(long, global = true)]
    pub base_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Vector store selection, overriding config.yaml
#[derive(ClapArgs, Debug, Clone)]
pub struct StoreArgs {
    /// Embedding model name
    #[clap(short, long)]
    pub model: Option<String>,

    /// Collection name. Defaults to the model name with '/' replaced by '-'
    #[clap(short, long)]
    pub collection: Option<String>,

    #[clap(long, value_enum)]
    pub backend: Option<VectorBackend>,

    /// Qdrant host
    #[clap(long)]
    pub host: Option<String>,

    /// Qdrant port
    #[clap(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract and normalize activity labels from a dataset csv
    Extract {
        /// Csv with the model id in column 0 and atom json in column 2
        input: PathBuf,

        /// Where the activities_*.json files are written
        #[clap(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Generate LLM paraphrases for every cleaned label of a mapping
    Paraphrase {
        /// activities_mapping.json produced by `extract`
        mapping: PathBuf,

        #[clap(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Ollama model
        #[clap(short, long)]
        model: Option<String>,

        /// Ollama server url
        #[clap(long)]
        base_url: Option<String>,

        #[clap(short, long)]
        temperature: Option<f32>,

        /// Paraphrases per activity
        #[clap(short, long)]
        num: Option<usize>,
    },

    /// Merge paraphrase files into one group per original label
    Merge {
        #[clap(required = true)]
        files: Vec<PathBuf>,

        #[clap(short, long)]
        output: PathBuf,
    },

    /// Add typo noise to the paraphrases of a merged file
    Noise {
        input: PathBuf,

        /// Defaults to activities_with_synonyms_merged_noise_<rate>.json
        /// next to the input
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Per character edit probability
        #[clap(short, long)]
        error_rate: Option<f64>,

        /// Seed for reproducible output
        #[clap(short, long)]
        seed: Option<u64>,
    },

    /// Load activity labels into a vector store collection.
    /// The collection is recreated
    Ingest {
        /// Json list of labels, e.g. activities_original.json
        input: PathBuf,

        #[command(flatten)]
        store: StoreArgs,

        /// Labels per upsert
        #[clap(short, long)]
        batch_size: Option<usize>,
    },

    /// Search a collection for labels similar to a query
    Search {
        query: String,

        #[command(flatten)]
        store: StoreArgs,

        /// Number of results
        #[clap(short, default_value = "5")]
        k: usize,
    },

    /// Print a label with its step code prefix removed
    Clean {
        label: String,
    },
}
