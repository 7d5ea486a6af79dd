//! CLI probe for fragment normalization.
//!
//! # Responsibility
//! - Verify `fragments_core` linkage from a standalone executable.
//! - Show the normalized document and the round-trip payload for one
//!   schema/payload pair.

use clap::Parser;
use fragments_core::{
    init_logging, FragmentService, LoggingConfig, MemoryRecordStore, ParentKey, Schema,
    SerializeOptions,
};
use log::error;
use serde_json::{json, Value};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "fragments_cli", version)]
struct Args {
    /// Schema JSON file declaring owner models and embedded collections.
    #[arg(long)]
    schema: PathBuf,
    /// Wire payload JSON file for one owner record.
    #[arg(long)]
    payload: PathBuf,
    /// Owner model type; defaults to the only model in the schema.
    #[arg(long)]
    model: Option<String>,
    /// Fallback owner id when the payload has none.
    #[arg(long)]
    id: Option<String>,
    #[arg(long, default_value = fragments_core::default_log_level())]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(&LoggingConfig {
        level: args.log_level.clone(),
        log_dir: None,
    }) {
        eprintln!("logging disabled: {err}");
    }

    match run(&args) {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<Value, Box<dyn Error>> {
    let schema = Schema::from_json_str(&std::fs::read_to_string(&args.schema)?)?;
    let payload: Value = serde_json::from_str(&std::fs::read_to_string(&args.payload)?)?;

    let model_type = match &args.model {
        Some(model) => model.clone(),
        None => {
            let mut models = schema.model_types();
            match (models.next(), models.next()) {
                (Some(only), None) => only.to_string(),
                _ => return Err("schema declares several models; pass --model".into()),
            }
        }
    };

    let mut service = FragmentService::new(MemoryRecordStore::new(), schema)?;
    let document = service.normalize_response(&model_type, &payload, args.id.as_deref())?;
    let serialized = service.serialize(
        &ParentKey::of(&document.parent),
        SerializeOptions { include_id: true },
    )?;

    Ok(json!({
        "core_version": fragments_core::core_version(),
        "normalized": document.to_json(),
        "serialized": serialized,
    }))
}
