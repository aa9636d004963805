use anyhow::{bail, Context};
use colored::Colorize;
use kvetch::{
    build_index, create_tables, nuke, open_shards, router, Attributes, Edge, IndexType,
    IndexValue, Kvetch, KvetchConfig, ObjectId, ObjectRecord, Page, Schema, ShardHandle, TypeId,
    Value,
};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = KvetchConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli.command, cli.format, config))
}

/// Opened shards plus the router over them.
struct Session {
    config: KvetchConfig,
    schema: Schema,
    shards: Vec<ShardHandle>,
    kvetch: Kvetch,
}

impl Session {
    fn open(config: KvetchConfig) -> anyhow::Result<Self> {
        let schema = config.schema()?;
        let shards = open_shards(&config)?;
        let kvetch = router(&config, &shards)?;
        debug!(shards = shards.len(), types = schema.objects().len(), "session opened");
        Ok(Self { config, schema, shards, kvetch })
    }
}

async fn dispatch(command: Command, format: OutputFormat, config: KvetchConfig) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    match command {
        Command::Init => cmd_init(&session).await,
        Command::Nuke(args) => cmd_nuke(&session, args).await,
        Command::BuildIndex(args) => cmd_build_index(&session, args).await,
        Command::Describe => cmd_describe(&session, format),
        Command::Insert(args) => cmd_insert(&session, args, format).await,
        Command::Update(args) => cmd_update(&session, args).await,
        Command::Delete(args) => cmd_delete(&session, args).await,
        Command::Get(args) => cmd_get(&session, args, format).await,
        Command::Scan(args) => cmd_scan(&session, args, format).await,
        Command::Edges(args) => cmd_edges(&session, args, format).await,
        Command::Index(args) => cmd_index(&session, args, format).await,
    }
}

async fn cmd_init(session: &Session) -> anyhow::Result<()> {
    create_tables(&session.shards, &session.schema).await?;
    println!("{} Initialized {} shard(s)", "✓".green().bold(), session.shards.len());
    for (i, shard) in session.kvetch.shards().iter().enumerate() {
        println!("  {} {}", format!("shard {i}:").dimmed(), shard.describe());
    }
    Ok(())
}

async fn cmd_nuke(session: &Session, args: NukeArgs) -> anyhow::Result<()> {
    if !args.yes {
        bail!("nuke drops every table on every shard; pass --yes to confirm");
    }
    nuke(&session.shards, &session.schema).await?;
    println!("{} Dropped and recreated {} shard(s)", "✓".green().bold(), session.shards.len());
    Ok(())
}

async fn cmd_build_index(session: &Session, args: BuildIndexArgs) -> anyhow::Result<()> {
    let written = build_index(&session.shards, &session.schema, &args.index).await?;
    println!("{} Built {}: {} entries", "✓".green().bold(), args.index.yellow(), written);
    Ok(())
}

fn cmd_describe(session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(serde_json::to_value(&session.config)?);
    }
    println!("{}", "Shards".bold());
    for (i, shard) in session.kvetch.shards().iter().enumerate() {
        println!("  {:>3}  {}", i, shard.describe());
    }
    println!("{}", "Objects".bold());
    for object in session.schema.objects() {
        println!("  {:>6}  {}", object.type_id, object.type_name.cyan());
    }
    println!("{}", "Indexes".bold());
    for index in session.schema.indexes() {
        println!(
            "  {} on {}.{} ({:?})",
            index.index_name.yellow(),
            index.indexed_type,
            index.indexed_attr,
            index.index_type
        );
    }
    println!("{}", "Edges".bold());
    for edge in session.schema.edges() {
        println!(
            "  {} #{} from {}.{}",
            edge.edge_name.yellow(),
            edge.edge_id,
            edge.stored_on_type,
            edge.stored_id_attr
        );
    }
    Ok(())
}

async fn cmd_insert(session: &Session, args: InsertArgs, format: OutputFormat) -> anyhow::Result<()> {
    let type_id = resolve_type(&session.schema, &args.object_type)?;
    let attributes = parse_attrs(&args.attrs)?;
    let id = session.kvetch.insert_object(type_id, &attributes).await?;
    match format {
        OutputFormat::Json => print_json(json!({ "id": id.to_string() })),
        OutputFormat::Text => {
            println!("{} Inserted {}", "✓".green().bold(), id.to_string().yellow());
            Ok(())
        }
    }
}

async fn cmd_update(session: &Session, args: UpdateArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let partial = parse_attrs(&args.attrs)?;
    session.kvetch.update_object(id, &partial).await?;
    println!("{} Updated {}", "✓".green().bold(), id.to_string().yellow());
    Ok(())
}

async fn cmd_delete(session: &Session, args: ObjectArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    session.kvetch.delete_object(id).await?;
    println!("{} Deleted {}", "✓".green().bold(), id.to_string().yellow());
    Ok(())
}

async fn cmd_get(session: &Session, args: ObjectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let Some(record) = session.kvetch.get_object(id).await? else {
        bail!("no object {id}");
    };
    match format {
        OutputFormat::Json => print_json(record_json(&record)),
        OutputFormat::Text => {
            print_record(&session.schema, &record);
            Ok(())
        }
    }
}

async fn cmd_scan(session: &Session, args: ScanArgs, format: OutputFormat) -> anyhow::Result<()> {
    let type_id = resolve_type(&session.schema, &args.object_type)?;
    let page = parse_page(&args.page)?;
    let objects = session.kvetch.get_objects_of_type(type_id, page).await?;
    let records: Vec<&ObjectRecord> = objects.values().collect();
    match format {
        OutputFormat::Json => print_json(records.iter().copied().map(record_json).collect()),
        OutputFormat::Text => {
            for record in &records {
                print_record(&session.schema, record);
            }
            print_cursor(records.last().map(|r| r.id), records.len(), page);
            Ok(())
        }
    }
}

async fn cmd_edges(session: &Session, args: EdgesArgs, format: OutputFormat) -> anyhow::Result<()> {
    let from = parse_id(&args.from)?;
    let page = parse_page(&args.page)?;
    let edges = session.kvetch.get_edges(&args.edge, from, page).await?;
    match (format, args.ids) {
        (OutputFormat::Json, true) => print_json(ids_json(edges.iter().map(|e| e.to_id))),
        (OutputFormat::Json, false) => print_json(edges.iter().map(edge_json).collect()),
        (OutputFormat::Text, ids_only) => {
            for edge in &edges {
                print_edge(edge, ids_only);
            }
            print_cursor(edges.last().map(|e| e.to_id), edges.len(), page);
            Ok(())
        }
    }
}

async fn cmd_index(session: &Session, args: IndexArgs, format: OutputFormat) -> anyhow::Result<()> {
    let value = parse_index_value(&session.schema, &args.index, &args.value)?;
    if args.ids {
        let ids = session.kvetch.get_ids_from_index(&args.index, value).await?;
        return match format {
            OutputFormat::Json => print_json(ids_json(ids.iter().copied())),
            OutputFormat::Text => {
                ids.iter().for_each(|id| println!("{id}"));
                Ok(())
            }
        };
    }
    let records = session.kvetch.get_from_index(&args.index, value).await?;
    match format {
        OutputFormat::Json => print_json(records.iter().map(record_json).collect()),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("{}", "No matches.".dimmed());
            }
            for record in &records {
                print_record(&session.schema, record);
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Accepts a declared type name or a declared numeric type id.
fn resolve_type(schema: &Schema, name: &str) -> anyhow::Result<TypeId> {
    if let Some(type_id) = schema.type_id_of(name) {
        return Ok(type_id);
    }
    match name.parse::<TypeId>() {
        Ok(type_id) if schema.object_type(type_id).is_some() => Ok(type_id),
        _ => bail!("unknown object type {name:?}"),
    }
}

fn parse_id(text: &str) -> anyhow::Result<ObjectId> {
    text.parse::<ObjectId>()
        .with_context(|| format!("invalid object id {text:?}"))
}

fn parse_page(args: &PageArgs) -> anyhow::Result<Page> {
    let mut page = Page::all();
    if let Some(after) = &args.after {
        page = page.after(parse_id(after)?);
    }
    if let Some(first) = args.first {
        page = page.first(first);
    }
    Ok(page)
}

fn parse_attrs(pairs: &[String]) -> anyhow::Result<Attributes> {
    pairs.iter().map(|pair| parse_attr(pair)).collect()
}

/// `key=value`. The value is read as null, a bool, an int, a float, or an
/// object id, in that order, and otherwise kept as a string. Double quotes
/// force a string.
fn parse_attr(pair: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("attribute {pair:?} is not key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("attribute {pair:?} has an empty name");
    }
    Ok((key.to_string(), parse_value(raw)))
}

fn parse_value(raw: &str) -> Value {
    if let Some(quoted) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Value::String(quoted.to_string());
    }
    match raw {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        if v.is_finite() && raw.bytes().any(|b| b.is_ascii_digit()) {
            return Value::Float(v);
        }
    }
    if raw.len() == 36 {
        if let Ok(id) = raw.parse::<ObjectId>() {
            return Value::Id(id);
        }
    }
    Value::String(raw.to_string())
}

/// Reads `text` as the index's declared column type.
fn parse_index_value(schema: &Schema, index_name: &str, text: &str) -> anyhow::Result<IndexValue> {
    let index = schema.index(index_name)?;
    Ok(match index.index_type {
        IndexType::String => IndexValue::Str(text.to_string()),
        IndexType::Int => IndexValue::Int(
            text.parse()
                .with_context(|| format!("index {index_name} takes ints, got {text:?}"))?,
        ),
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Plain JSON for a value: ids as UUID text, timestamps as RFC 3339.
fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => json!(v),
        Value::Int(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::String(v) => json!(v),
        Value::Id(v) => json!(v.to_string()),
        Value::Timestamp(v) => json!(v.to_rfc3339()),
    }
}

fn attributes_json(attributes: &Attributes) -> serde_json::Value {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), value_json(v)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn record_json(record: &ObjectRecord) -> serde_json::Value {
    json!({
        "id": record.id.to_string(),
        "type_id": record.type_id,
        "created": record.created.to_rfc3339(),
        "updated": record.updated.to_rfc3339(),
        "attributes": attributes_json(&record.attributes),
    })
}

fn edge_json(edge: &Edge) -> serde_json::Value {
    json!({
        "edge_id": edge.edge_id,
        "from_id": edge.from_id.to_string(),
        "to_id": edge.to_id.to_string(),
        "created": edge.created.to_rfc3339(),
        "payload": attributes_json(&edge.payload),
    })
}

fn ids_json(ids: impl Iterator<Item = ObjectId>) -> serde_json::Value {
    ids.map(|id| json!(id.to_string())).collect()
}

fn print_record(schema: &Schema, record: &ObjectRecord) {
    let type_name = schema
        .object_type(record.type_id)
        .map(|t| t.type_name.as_str())
        .unwrap_or("?");
    println!(
        "{}  {} ({})",
        record.id.to_string().yellow().bold(),
        type_name.cyan(),
        record.type_id
    );
    println!(
        "  {} {}  {} {}",
        "created".dimmed(),
        record.created.to_rfc3339(),
        "updated".dimmed(),
        record.updated.to_rfc3339()
    );
    for (key, value) in &record.attributes {
        println!("  {key} = {value}");
    }
}

fn print_edge(edge: &Edge, ids_only: bool) {
    if ids_only {
        println!("{}", edge.to_id);
        return;
    }
    let payload: Vec<String> = edge
        .payload
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    println!(
        "{} -> {}  {}",
        edge.from_id.short_hex().dimmed(),
        edge.to_id.to_string().yellow(),
        payload.join(" ")
    );
}

/// Hint for fetching the next page when this one came back full.
fn print_cursor(last: Option<ObjectId>, returned: usize, page: Page) {
    if let (Some(last), Some(first)) = (last, page.first) {
        if returned == first {
            println!("{} --after {last}", "next:".dimmed());
        }
    }
}
