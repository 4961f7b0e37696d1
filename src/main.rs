use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod artifacts;
mod cli;
mod config;
mod errors;
mod extract;
mod merge;
mod noise;
mod normalize;
mod paraphrase;
mod semantic;
#[cfg(test)]
mod tests;

use cli::StoreArgs;
use config::{Config, VectorBackend};
use paraphrase::OllamaParaphraser;
use semantic::{EmbeddingModel, LocalVectorStore, QdrantStore, VectorStore};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();

    let base_path = args.base_path;

    match args.command {
        cli::Command::Clean { label } => {
            println!("{}", normalize::clean_label(&label));
            Ok(())
        }

        cli::Command::Extract { input, out_dir } => {
            let _span = tracing::info_span!("extract").entered();
            let extracted = extract::extract_and_process_activities(&input, &out_dir)
                .with_context(|| format!("extracting activities from {}", input.display()))?;
            log::info!(
                "Wrote {} raw labels to {}",
                extracted.raw.len(),
                out_dir.display()
            );
            Ok(())
        }

        cli::Command::Paraphrase {
            mapping,
            out_dir,
            model,
            base_url,
            temperature,
            num,
        } => {
            let _span = tracing::info_span!("paraphrase").entered();
            let mut config = load_config(base_path.as_deref())?;
            if let Some(model) = model {
                config.llm.model = model;
            }
            if let Some(base_url) = base_url {
                config.llm.base_url = base_url;
            }
            if let Some(temperature) = temperature {
                config.llm.temperature = temperature;
            }
            if let Some(num) = num {
                config.llm.num_paraphrases = num;
            }
            config.validate()?;

            let paraphraser = OllamaParaphraser::new(&config.llm)?;
            let path = paraphrase::generate_and_save(&mapping, &out_dir, &paraphraser, &config.llm)
                .with_context(|| format!("paraphrasing {}", mapping.display()))?;
            println!("{}", path.display());
            Ok(())
        }

        cli::Command::Merge { files, output } => {
            let _span = tracing::info_span!("merge").entered();
            let groups = merge::merge_paraphrases(&files, &output)
                .with_context(|| format!("merging into {}", output.display()))?;
            log::info!("Merged {} files into {} groups", files.len(), groups.len());
            Ok(())
        }

        cli::Command::Noise {
            input,
            output,
            error_rate,
            seed,
        } => {
            let _span = tracing::info_span!("noise").entered();
            let mut config = load_config(base_path.as_deref())?;
            if let Some(error_rate) = error_rate {
                config.noise.error_rate = error_rate;
            }
            if let Some(seed) = seed {
                config.noise.seed = Some(seed);
            }
            config.validate()?;

            let output = output.unwrap_or_else(|| {
                sibling(&input, &noise::default_output_name(config.noise.error_rate))
            });
            let mut rng = match config.noise.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let count =
                noise::add_noise_to_paraphrases(&input, &output, config.noise.error_rate, &mut rng)
                    .with_context(|| format!("adding noise to {}", input.display()))?;
            log::info!("Noised {count} groups into {}", output.display());
            Ok(())
        }

        cli::Command::Ingest {
            input,
            store,
            batch_size,
        } => {
            let _span = tracing::info_span!("ingest").entered();
            let mut config = load_config(base_path.as_deref())?;
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            let collection = apply_store_args(&mut config, store)?;

            let texts: Vec<String> = artifacts::read_json(&input)
                .with_context(|| format!("reading labels from {}", input.display()))?;

            let embedder = load_embedder(&config)?;
            let mut store = open_store(&config)?;
            semantic::import_activities(
                &texts,
                &embedder,
                store.as_mut(),
                &collection,
                config.batch_size,
            )
            .with_context(|| format!("loading collection '{collection}'"))?;
            Ok(())
        }

        cli::Command::Search { query, store, k } => {
            let _span = tracing::info_span!("search").entered();
            let mut config = load_config(base_path.as_deref())?;
            let collection = apply_store_args(&mut config, store)?;

            let embedder = load_embedder(&config)?;
            let mut store = open_store(&config)?;
            let results =
                semantic::search_activities(&query, &embedder, store.as_mut(), &collection, k)
                    .with_context(|| format!("searching collection '{collection}'"))?;

            println!("{}", serde_json::to_string_pretty(&to_json(&results))?);
            Ok(())
        }
    }
}

fn load_config(base_path: Option<&Path>) -> anyhow::Result<Config> {
    let base_path = match base_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_base_path()?,
    };
    Config::load_with(&base_path)
        .with_context(|| format!("loading config from {}", base_path.display()))
}

/// Apply vector store flags to `config` and return the collection name.
fn apply_store_args(config: &mut Config, args: StoreArgs) -> anyhow::Result<String> {
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(backend) = args.backend {
        config.vector_store.backend = backend;
    }
    if let Some(host) = &args.host {
        config.vector_store.host = host.clone();
    }
    if let Some(port) = args.port {
        config.vector_store.port = port;
    }
    config.validate()?;

    let ignored = ignored_store_flags(config, &args);
    if !ignored.is_empty() {
        log::warn!(
            "{} only apply to the qdrant backend, the local store ignores them (use --backend qdrant)",
            ignored.join(", ")
        );
    }

    Ok(args
        .collection
        .unwrap_or_else(|| semantic::collection_name(&config.model)))
}

/// Address flags that have no effect with the configured backend.
fn ignored_store_flags(config: &Config, args: &StoreArgs) -> Vec<&'static str> {
    if config.vector_store.backend != VectorBackend::Local {
        return vec![];
    }

    let mut ignored = vec![];
    if args.host.is_some() {
        ignored.push("--host");
    }
    if args.port.is_some() {
        ignored.push("--port");
    }
    ignored
}

fn load_embedder(config: &Config) -> anyhow::Result<EmbeddingModel> {
    EmbeddingModel::new(
        &config.model,
        config.model_cache_dir(),
        Some(Duration::from_secs(config.download_timeout_secs)),
    )
    .with_context(|| format!("loading embedding model '{}'", config.model))
}

fn open_store(config: &Config) -> anyhow::Result<Box<dyn VectorStore>> {
    let store: Box<dyn VectorStore> = match config.vector_store.backend {
        VectorBackend::Local => Box::new(LocalVectorStore::new(config.collections_dir())?),
        VectorBackend::Qdrant => Box::new(QdrantStore::new(
            &config.vector_store.host,
            config.vector_store.port,
        )?),
    };
    Ok(store)
}

fn to_json(results: &[semantic::ScoredText]) -> Vec<serde_json::Value> {
    results
        .iter()
        .map(|r| serde_json::json!({ "text": r.text, "score": r.score }))
        .collect()
}

/// `name` in the directory of `path`.
fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
