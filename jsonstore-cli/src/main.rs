use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jsonstore_core::{
    parse_query, AddOptions, CollectionSchema, CountOptions, FindOptions, OpenCollectionOptions,
    SortDirection, SortKey, Store, StoreConfig,
};
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_DB: &str = "jsonstore.db";

#[derive(Parser)]
#[command(name = "jsonstore")]
#[command(about = "jsonstore CLI - inspect and edit a jsonstore database")]
#[command(version)]
struct Cli {
    /// Database file path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Store configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import documents from a JSON file
    ///
    /// With --collection the file is an array of documents; otherwise it is
    /// an object mapping collection names to arrays.
    Import {
        file: PathBuf,
        #[arg(long)]
        collection: Option<String>,
        /// Record the documents as local adds
        #[arg(long)]
        dirty: bool,
    },
    /// Export live documents to a JSON file
    Export {
        file: PathBuf,
        /// Export only this collection
        #[arg(long)]
        collection: Option<String>,
    },
    /// Schema management commands
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// Query a collection
    Find {
        #[arg(long)]
        collection: String,
        /// Query as JSON: [[{"field": .., "operator": .., "value": ..}, ..], ..]
        #[arg(long, default_value = "[]")]
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// Sort key as field:asc or field:desc, repeatable
        #[arg(long, value_parser = parse_sort_key)]
        sort: Vec<SortKey>,
        /// Field to project, repeatable
        #[arg(long)]
        filter: Vec<String>,
        #[arg(long)]
        include_deleted: bool,
    },
    /// Count matching documents
    Count {
        #[arg(long)]
        collection: String,
        #[arg(long, default_value = "[]")]
        query: String,
        #[arg(long)]
        include_deleted: bool,
    },
    /// List documents with unsynchronized changes
    Dirty {
        #[arg(long)]
        collection: String,
    },
    /// Acknowledge synchronized documents
    MarkClean {
        #[arg(long)]
        collection: String,
        ids: Vec<i64>,
        /// Every dirty document of the collection
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// Declare a collection from a schema file, or every *.schema.json in a directory
    Load {
        path: PathBuf,
        /// Collection name (required for single file, ignored for directory)
        #[arg(long)]
        collection: Option<String>,
        /// Drop and recreate collections whose fields changed
        #[arg(long)]
        drop: bool,
    },
    /// Print declared schemas
    Show {
        #[arg(long)]
        collection: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let store = open_store(cli.db.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::Import {
            file,
            collection,
            dirty,
        } => import_data(&store, &file, collection.as_deref(), dirty),
        Commands::Export { file, collection } => {
            export_data(&store, &file, collection.as_deref())
        }
        Commands::Schema { action } => match action {
            SchemaAction::Load {
                path,
                collection,
                drop,
            } => load_schema(&store, &path, collection.as_deref(), drop),
            SchemaAction::Show { collection } => show_schema(&store, collection.as_deref()),
        },
        Commands::Find {
            collection,
            query,
            limit,
            offset,
            sort,
            filter,
            include_deleted,
        } => {
            let options = FindOptions {
                limit,
                offset,
                sort,
                filter,
                include_deleted,
            };
            find(&store, &collection, &query, &options)
        }
        Commands::Count {
            collection,
            query,
            include_deleted,
        } => count(&store, &collection, &query, include_deleted),
        Commands::Dirty { collection } => list_dirty(&store, &collection),
        Commands::MarkClean {
            collection,
            ids,
            all,
        } => mark_clean(&store, &collection, ids, all),
    }?;

    store.close().context("Failed to close database")?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn open_store(db: Option<&Path>, config: Option<&Path>) -> Result<Store> {
    let mut store_config = match config {
        Some(path) => StoreConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(db) = db {
        store_config.path = Some(db.to_path_buf());
    } else if store_config.path.is_none() {
        store_config.path = Some(PathBuf::from(DEFAULT_DB));
    }
    debug!("Store config: {:?}", store_config);

    let path = store_config.path.clone().unwrap_or_default();
    Store::open(store_config)
        .with_context(|| format!("Failed to open database: {}", path.display()))
}

fn parse_sort_key(value: &str) -> std::result::Result<SortKey, String> {
    let (field, direction) = match value.rsplit_once(':') {
        Some((field, direction)) => (field, direction),
        None => (value, "asc"),
    };
    let direction = match direction.to_ascii_lowercase().as_str() {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        other => return Err(format!("unknown sort direction '{}'", other)),
    };
    if field.is_empty() {
        return Err("sort field must not be empty".to_string());
    }
    Ok(SortKey {
        field: field.to_string(),
        direction,
    })
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in file: {}", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    println!("{}", text);
    Ok(())
}

/// Group an import file by collection
fn import_batches(data: Value, collection: Option<&str>) -> Result<Vec<(String, Vec<Value>)>> {
    match (collection, data) {
        (Some(name), Value::Array(documents)) => Ok(vec![(name.to_string(), documents)]),
        (Some(_), _) => bail!("With --collection the file must contain an array of documents"),
        (None, Value::Object(map)) => map
            .into_iter()
            .map(|(name, documents)| match documents {
                Value::Array(documents) => Ok((name, documents)),
                _ => bail!("Collection '{}' must be an array", name),
            })
            .collect(),
        (None, _) => bail!("Expected an object of collection name -> documents"),
    }
}

/// Import data from JSON file
fn import_data(store: &Store, file: &Path, collection: Option<&str>, dirty: bool) -> Result<()> {
    let batches = import_batches(read_json(file)?, collection)?;
    let options = AddOptions::default().mark_dirty(dirty);

    let mut total_docs = 0;
    for (name, documents) in batches {
        let coll = store
            .collection(&name)
            .with_context(|| format!("Unknown collection '{}' (load its schema first)", name))?;
        let ids = coll
            .add(&documents, &options)
            .with_context(|| format!("Failed to import into '{}'", name))?;
        println!("Imported {} documents into '{}'", ids.len(), name);
        total_docs += ids.len();
    }

    println!("Total: {} documents imported", total_docs);
    Ok(())
}

/// Export database to JSON file
/// Format: { "collection_name": [{"_id": .., "json": ..}, ...], ... }
fn export_data(store: &Store, file: &Path, collection_filter: Option<&str>) -> Result<()> {
    let names = match collection_filter {
        Some(name) => vec![name.to_string()],
        None => store.collection_names()?,
    };

    let mut output = Map::new();
    let mut total_docs = 0;
    for name in names {
        let coll = store
            .collection(&name)
            .with_context(|| format!("Failed to get collection: {}", name))?;
        let docs = coll
            .find_all(&FindOptions::default())
            .with_context(|| format!("Failed to query collection: {}", name))?;

        println!("Exporting {} documents from '{}'", docs.len(), name);
        total_docs += docs.len();
        output.insert(name, Value::Array(docs.iter().map(|d| d.to_value()).collect()));
    }

    let json = serde_json::to_string_pretty(&Value::Object(output))
        .context("Failed to serialize to JSON")?;
    fs::write(file, json).with_context(|| format!("Failed to write to file: {}", file.display()))?;

    println!("Total: {} documents exported to {}", total_docs, file.display());
    Ok(())
}

fn declare_collection(store: &Store, name: &str, path: &Path, drop: bool) -> Result<()> {
    let schema = CollectionSchema::from_value(&read_json(path)?)
        .with_context(|| format!("Invalid schema in: {}", path.display()))?;
    let options = OpenCollectionOptions {
        drop_collection: drop,
    };
    store
        .open_collection(name, schema, &options)
        .with_context(|| format!("Failed to declare collection '{}'", name))?;
    println!("Loaded schema for '{}' from {}", name, path.display());
    Ok(())
}

/// Load schema from file or directory (modular)
fn load_schema(store: &Store, path: &Path, collection: Option<&str>, drop: bool) -> Result<()> {
    if !path.is_dir() {
        let name = collection.ok_or_else(|| {
            anyhow::anyhow!("--collection required when loading single schema file")
        })?;
        return declare_collection(store, name, path, drop);
    }

    let entries = fs::read_dir(path)
        .with_context(|| format!("Failed to read directory: {}", path.display()))?;
    let mut count = 0;
    for entry in entries {
        let file_path = entry?.path();
        let name = match file_path.file_name().and_then(|n| n.to_str()) {
            Some(file_name) if file_name.ends_with(".schema.json") => {
                file_name.trim_end_matches(".schema.json").to_string()
            }
            _ => continue,
        };
        declare_collection(store, &name, &file_path, drop)?;
        count += 1;
    }
    println!("Total: {} schemas loaded from {}", count, path.display());
    Ok(())
}

fn show_schema(store: &Store, collection: Option<&str>) -> Result<()> {
    let names = match collection {
        Some(name) => vec![name.to_string()],
        None => store.collection_names()?,
    };
    let mut output = Map::new();
    for name in names {
        let coll = store
            .collection(&name)
            .with_context(|| format!("Failed to get collection: {}", name))?;
        output.insert(name, serde_json::to_value(coll.schema())?);
    }
    print_json(&Value::Object(output))
}

fn find(store: &Store, collection: &str, query: &str, options: &FindOptions) -> Result<()> {
    let query = parse_query(&serde_json::from_str(query).context("Query is not valid JSON")?)
        .context("Invalid query")?;
    let coll = store
        .collection(collection)
        .with_context(|| format!("Failed to get collection: {}", collection))?;
    let rows = coll.find(&query, options)?;
    print_json(&Value::Array(rows))
}

fn count(store: &Store, collection: &str, query: &str, include_deleted: bool) -> Result<()> {
    let query = parse_query(&serde_json::from_str(query).context("Query is not valid JSON")?)
        .context("Invalid query")?;
    let coll = store
        .collection(collection)
        .with_context(|| format!("Failed to get collection: {}", collection))?;
    let count = coll.count(&query, &CountOptions::default().include_deleted(include_deleted))?;
    println!("{}", count);
    Ok(())
}

fn list_dirty(store: &Store, collection: &str) -> Result<()> {
    let coll = store
        .collection(collection)
        .with_context(|| format!("Failed to get collection: {}", collection))?;
    let dirty = coll.all_dirty()?;
    print_json(&serde_json::to_value(dirty)?)
}

fn mark_clean(store: &Store, collection: &str, ids: Vec<i64>, all: bool) -> Result<()> {
    let coll = store
        .collection(collection)
        .with_context(|| format!("Failed to get collection: {}", collection))?;
    let ids = if all {
        coll.all_dirty()?.iter().map(|d| d.id).collect()
    } else {
        ids
    };
    if ids.is_empty() {
        bail!("Nothing to mark clean: pass ids or --all");
    }
    let cleaned = coll.mark_clean(&ids)?;
    println!("Marked {} documents clean in '{}'", cleaned, collection);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sort_key() {
        let key = parse_sort_key("age:desc").unwrap();
        assert_eq!(key.field, "age");
        assert_eq!(key.direction, SortDirection::Desc);
        assert_eq!(parse_sort_key("name").unwrap().direction, SortDirection::Asc);
        assert_eq!(parse_sort_key("address.city:ASC").unwrap().field, "address.city");
        assert!(parse_sort_key("age:sideways").is_err());
        assert!(parse_sort_key(":asc").is_err());
    }

    #[test]
    fn test_import_batches() {
        let batches = import_batches(json!([{"a": 1}]), Some("people")).unwrap();
        assert_eq!(batches, vec![("people".to_string(), vec![json!({"a": 1})])]);

        let batches = import_batches(json!({"people": [{"a": 1}], "notes": []}), None).unwrap();
        assert_eq!(batches.len(), 2);

        assert!(import_batches(json!({"people": {}}), None).is_err());
        assert!(import_batches(json!([{"a": 1}]), None).is_err());
        assert!(import_batches(json!({}), Some("people")).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "jsonstore",
            "--db",
            "x.db",
            "find",
            "--collection",
            "people",
            "--sort",
            "age:desc",
            "--sort",
            "name",
            "--filter",
            "name",
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        match cli.command {
            Commands::Find {
                sort, filter, limit, ..
            } => {
                assert_eq!(sort.len(), 2);
                assert_eq!(filter, vec!["name"]);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected find"),
        }
    }
}
