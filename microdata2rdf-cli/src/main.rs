use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use microdata2rdf::{Options, RegistryIndex};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("schema", "http://schema.org/"),
    ("rdfa", "http://www.w3.org/ns/rdfa#"),
    ("dc", "http://purl.org/dc/terms/"),
];

/// Extract RDF from the microdata in an HTML document.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// An http(s) URL or a local file.
    #[arg(value_name = "URL|FILE")]
    target: String,

    /// Base IRI for the document; defaults to the target's location.
    #[arg(long, value_name = "IRI")]
    base: Option<String>,

    /// JSON vocabulary registry to use instead of the built-in one.
    #[arg(long, value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Apply vocabulary expansion to the output.
    #[arg(long)]
    expand: bool,

    /// Fail on the first error instead of recording it.
    #[arg(long)]
    validate: bool,

    /// Write typed literals in canonical form.
    #[arg(long)]
    canonicalize: bool,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let registry = match &args.registry {
        Some(path) => {
            debug!("loading registry from {}", path.display());
            RegistryIndex::from_json(&std::fs::read_to_string(path)?)?
        }
        None => RegistryIndex::builtin().clone(),
    };
    debug!(
        "vocabulary registries: {}",
        registry
            .iter()
            .map(|vocabulary| vocabulary.prefix())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (location, content) = match url::Url::parse(&args.target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let Some(content) = fetch(&url)? else {
                eprintln!("Error: content type is not text/html.");
                return Ok(ExitCode::FAILURE);
            };
            (url, content)
        }
        _ => {
            let path = std::fs::canonicalize(&args.target)?;
            let url = url::Url::from_file_path(&path)
                .map_err(|()| format!("cannot make a URL from {}", path.display()))?;
            (url, std::fs::read_to_string(&path)?)
        }
    };

    let base = args.base.unwrap_or_else(|| location.to_string());
    let base_iri = oxiri::Iri::parse(base.clone())?;
    info!("extracting microdata from {location} with base <{base_iri}>");

    let options = Options {
        validate: args.validate,
        canonicalize: args.canonicalize,
        vocab_expansion: args.expand,
    };

    let mut output_graph = oxrdf::Graph::new();
    let mut processor_graph = oxrdf::Graph::new();
    microdata2rdf::process(
        &content,
        base_iri,
        &registry,
        &options,
        &mut output_graph,
        &mut processor_graph,
    )?;

    {
        // output any warnings/errors
        let serializer = oxttl::TurtleSerializer::new();
        let mut locked_err = std::io::stderr().lock();
        let mut writer = serializer.for_writer(&mut locked_err);
        for triple in processor_graph.iter() {
            writer.serialize_triple(triple)?;
        }

        writer.finish()?;
    }

    {
        let serializer = PREFIXES.iter().try_fold(
            oxttl::TurtleSerializer::new().with_base_iri(base)?,
            |serializer, (prefix, value)| serializer.with_prefix(*prefix, *value),
        )?;

        let mut locked_out = std::io::stdout().lock();
        let mut writer = serializer.for_writer(&mut locked_out);
        for triple in output_graph.iter() {
            writer.serialize_triple(triple)?;
        }

        writer.finish()?;
    }

    Ok(ExitCode::SUCCESS)
}

/// Fetches an HTML document; `None` if the server says it is something else.
fn fetch(url: &url::Url) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let client = reqwest::blocking::Client::new();
    let response = client.get(url.clone()).send()?.error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if content_type.is_some_and(|ct| !ct.starts_with("text/html")) {
        return Ok(None);
    }

    Ok(Some(response.text()?))
}
