//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `docmap_core` linkage and a full save/get cycle against SQLite.
//! - Keep output deterministic apart from generated keys.
//!
//! Usage: `docmap_cli [config.json]`. Without a config the probe runs against
//! an in-memory database and does not log to disk.

use docmap_core::{
    init_from_config, open_db_with, CoreConfig, Key, Mappable, Model, ModelError, Plain, Schema,
    SchemaBuilder, ScopeStack,
};
use log::info;
use once_cell::sync::Lazy;
use std::error::Error;
use std::process::ExitCode;

#[derive(Debug, Default)]
struct Probe {
    id: Option<Key>,
    label: String,
    runs: u32,
}

impl Mappable for Probe {
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: Lazy<Schema<Probe>> = Lazy::new(|| {
            SchemaBuilder::<Probe>::model("Probe")
                .attribute("label", Plain::new("smoke".to_string()), |p| &p.label, |p| {
                    &mut p.label
                })
                .attribute("runs", Plain::new(0_u32), |p| &p.runs, |p| &mut p.runs)
                .build()
        });
        &SCHEMA
    }
}

impl Model for Probe {
    fn id(&self) -> &Option<Key> {
        &self.id
    }

    fn id_mut(&mut self) -> &mut Option<Key> {
        &mut self.id
    }
}

fn load_config() -> Result<CoreConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            Ok(CoreConfig::from_json_str(&text)?)
        }
        None => Ok(CoreConfig::default()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("docmap_core version={}", docmap_core::core_version());

    let config = load_config()?;
    init_from_config(&config)?;

    let connection = open_db_with(&config.database)?;
    let mut scope = ScopeStack::new();
    let (description, stored) = scope.with_connection(connection, |scope| {
        let mut probe = Probe::with_defaults();
        probe.runs = 1;
        probe.save(scope)?;

        let key = probe.id.clone().ok_or(ModelError::MissingKey {
            table: Probe::table().to_string(),
        })?;
        let handle = Probe::get(scope, key)?;
        let loaded = handle.borrow();
        Ok((loaded.describe().to_string(), loaded.to_document()?))
    })?;

    println!("docmap_core stored={}", serde_json::to_string(&stored)?);
    info!("event=cli_probe module=cli status=ok");
    println!("docmap_core loaded={description}");
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("docmap_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}
