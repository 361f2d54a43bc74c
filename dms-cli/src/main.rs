use clap::{Parser, Subcommand, ValueEnum};
use dms::{Config, Database, Field, FieldType, ItemPayload, Service};
use std::path::PathBuf;
use std::process;

/// Manage dms databases, tables and items from the command line
#[derive(Parser)]
#[command(name = "dms", version, about)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, default_value = "dms.yaml")]
    config: PathBuf,

    /// SQLite store path (overrides the config file)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Check connectivity with the backing store
    Health,

    /// Manage databases
    #[command(subcommand)]
    Db(DbCommand),

    /// Manage tables of a database
    #[command(subcommand)]
    Table(TableCommand),

    /// Manage items of a table
    #[command(subcommand)]
    Item(ItemCommand),
}

#[derive(Subcommand)]
enum DbCommand {
    /// List user-created databases
    List,
    /// Create a database, optionally with empty tables
    Create {
        name: String,
        /// Table to create in the new database (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },
    /// Delete a database with all its tables
    Delete { name: String },
}

#[derive(Subcommand)]
enum TableCommand {
    /// List schema records of a database
    List { database: String },
    /// Create a table
    Create {
        database: String,
        name: String,
        /// Field definition (e.g. --field quantity:integer)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<Field>,
    },
    /// Delete a table by its identifier
    Delete { database: String, id: String },
}

#[derive(Subcommand)]
enum ItemCommand {
    /// List items of a table
    List { database: String, table: String },
    /// Get a single item
    Get {
        database: String,
        table: String,
        id: String,
    },
    /// Insert a new item
    Insert {
        database: String,
        table: String,
        /// Field values (e.g. --value quantity=3 --value name=Alice)
        #[arg(long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },
    /// Replace the values of an item
    Update {
        database: String,
        table: String,
        id: String,
        #[arg(long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },
    /// Delete an item
    Delete {
        database: String,
        table: String,
        id: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_field(s: &str) -> Result<Field, String> {
    let (name, type_name) = s
        .split_once(':')
        .ok_or_else(|| format!("Invalid field '{s}': expected name:type"))?;
    let field_type = FieldType::from_name(type_name).ok_or_else(|| {
        let known: Vec<&str> = FieldType::ALL.iter().map(|t| t.as_str()).collect();
        format!("Unknown field type '{type_name}', expected one of: {}", known.join(", "))
    })?;
    Ok(Field::new(name, field_type))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    log::debug!("Loading config from {}", cli.config.display());
    let mut config = Config::load(&cli.config)?;
    config.apply_env()?;
    if let Some(path) = cli.store {
        config.store.path = path;
    }
    log::debug!(
        "Opening {:?} store at {}",
        config.store.backend,
        config.store.path.display()
    );
    let service = Service::from_config(&config)?;

    let output = match cli.command {
        Command::Health => serde_json::json!({ "database_status": service.health().await }),

        Command::Db(DbCommand::List) => serde_json::json!(service.list_databases().await?),
        Command::Db(DbCommand::Create { name, tables }) => {
            let name = service
                .create_database(&Database::new(name).with_tables(tables))
                .await?;
            serde_json::json!({ "database_name": name })
        }
        Command::Db(DbCommand::Delete { name }) => {
            serde_json::json!({ "deleted": service.delete_database(&name).await? })
        }

        Command::Table(TableCommand::List { database }) => {
            serde_json::json!(service.list_tables(&database).await?)
        }
        Command::Table(TableCommand::Create {
            database,
            name,
            fields,
        }) => {
            let id = service.create_table(&database, &name, fields).await?;
            serde_json::json!({ "id": id })
        }
        Command::Table(TableCommand::Delete { database, id }) => {
            serde_json::json!({ "deleted": service.delete_table(&database, &id).await? })
        }

        Command::Item(ItemCommand::List { database, table }) => {
            let items = service
                .list_items(&database, &table)
                .await?
                .collect::<dms::Result<Vec<_>>>()?;
            serde_json::json!(items)
        }
        Command::Item(ItemCommand::Get {
            database,
            table,
            id,
        }) => serde_json::json!(service.get_item(&database, &table, &id).await?),
        Command::Item(ItemCommand::Insert {
            database,
            table,
            values,
        }) => {
            let id = service
                .create_item(&database, &table, values_to_payload(&values))
                .await?;
            serde_json::json!({ "id": id })
        }
        Command::Item(ItemCommand::Update {
            database,
            table,
            id,
            values,
        }) => {
            let id = service
                .update_item(&database, &table, &id, values_to_payload(&values))
                .await?;
            serde_json::json!({ "id": id })
        }
        Command::Item(ItemCommand::Delete {
            database,
            table,
            id,
        }) => serde_json::json!({ "deleted": service.delete_item(&database, &table, &id).await? }),
    };

    print_output(&output, &cli.format)?;
    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Values are read as JSON where possible (`3`, `1.5`, `{"start_date": ..}`),
/// otherwise taken as plain strings.
fn values_to_payload(values: &[(String, String)]) -> ItemPayload {
    let mut map = serde_json::Map::new();
    for (key, val) in values {
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        map.insert(key.clone(), json_val);
    }
    ItemPayload::from(map)
}
