use clap::Parser;
use comfy_table::Table;
use rowcache::cache::{format_memory_size, MemoryStore, SkipMode};
use rowcache::{
  CacheStore, CachingDriver, Driver, DriverRegistry, QueryContext, RowCacheConfig, SqliteDriver,
  Value,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
  name = "rowcache",
  about = "Run a query through the result cache",
  version
)]
struct Args {
  /// Statement to run
  query: String,
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long, env = "ROWCACHE_SQLITE_PATH")]
  sqlite: Option<String>,
  #[cfg(feature = "postgres")]
  #[arg(long, env = "ROWCACHE_PG_URL")]
  pg_url: Option<String>,
  /// SQL file executed before the query (schema, fixtures)
  #[arg(long)]
  setup: Option<String>,
  /// How many times to run the query
  #[arg(short, long, default_value_t = 2)]
  repeat: usize,
  /// Bound argument; repeat for several. `null`, booleans and numbers are typed.
  #[arg(short, long = "arg")]
  args: Vec<String>,
  /// Tie the query to an entity, as TYPE:ID
  #[arg(long)]
  entity: Option<String>,
  /// Entry TTL in seconds
  #[arg(long)]
  ttl: Option<u64>,
  /// Bypass the cache
  #[arg(long)]
  skip: bool,
  /// Print the final stats as JSON
  #[arg(long)]
  json: bool,
  #[arg(long)]
  log_level: Option<String>,
}

fn parse_arg(raw: &str) -> Value {
  match raw {
    "null" | "NULL" => Value::Null,
    "true" => Value::Bool(true),
    "false" => Value::Bool(false),
    _ => {
      if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
      } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
      } else {
        Value::Text(raw.to_string())
      }
    }
  }
}

fn context(args: &Args) -> Result<QueryContext, anyhow::Error> {
  let mut ctx = QueryContext::new();
  if let Some(entity) = &args.entity {
    let (typ, id) = entity
      .split_once(':')
      .ok_or_else(|| anyhow::anyhow!("--entity expects TYPE:ID, got {}", entity))?;
    ctx = ctx.with_entry_key(typ, id);
  }
  if let Some(secs) = args.ttl {
    ctx = ctx.with_ttl(Duration::from_secs(secs));
  }
  if args.skip {
    ctx = ctx.with_skip_mode(SkipMode::All);
  }
  Ok(ctx)
}

async fn open_backend(
  args: &Args,
  config: &RowCacheConfig,
) -> Result<Arc<dyn Driver>, anyhow::Error> {
  #[cfg(feature = "postgres")]
  if let Some(url) = &args.pg_url {
    return Ok(Arc::new(rowcache::PostgresDriver::new(
      url,
      config.postgres.max_connections,
    )?));
  }

  let path = args.sqlite.as_deref().unwrap_or(&config.sqlite.path);
  let driver = SqliteDriver::new(path).await?;
  if let Some(setup) = &args.setup {
    driver.execute_batch(&std::fs::read_to_string(setup)?).await?;
  }
  Ok(Arc::new(driver))
}

async fn open_store(config: &RowCacheConfig) -> Result<Arc<dyn CacheStore>, anyhow::Error> {
  let local: Arc<dyn CacheStore> = Arc::new(MemoryStore::from_config(&config.cache.store));
  tracing::info!(
    max_memory = %format_memory_size(config.cache.store.max_memory_bytes()),
    eviction = %config.cache.store.eviction,
    "Local cache store ready"
  );

  #[cfg(feature = "redis")]
  if config.redis.is_configured() {
    let mut remote = rowcache::cache::RedisStore::new(&config.redis.url).await?;
    if let Some(ttl) = config.cache.store.default_ttl() {
      remote = remote.with_default_ttl(ttl);
    }
    remote.ping().await?;
    return Ok(Arc::new(rowcache::TieredStore::new(local, Arc::new(remote))));
  }

  Ok(local)
}

fn print_rows(columns: &[String], rows: &[Vec<Value>]) {
  let mut table = Table::new();
  table.set_header(columns);
  for row in rows {
    table.add_row(row.iter().map(Value::to_string).collect::<Vec<_>>());
  }
  println!("{table}");
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    RowCacheConfig::from_file(path)?
  } else {
    RowCacheConfig::find_and_load()?.unwrap_or_default()
  };

  if let Some(level) = &args.log_level {
    config.logging.level = level.clone();
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let backend = open_backend(&args, &config).await?;
  let store = open_store(&config).await?;

  let registry = DriverRegistry::new();
  let driver = registry.register(
    CachingDriver::builder(backend)
      .config(config.driver_config())
      .store(store),
  );
  driver.start_gc();

  let params: Vec<Value> = args.args.iter().map(|a| parse_arg(a)).collect();
  for run in 1..=args.repeat.max(1) {
    let mut ctx = context(&args)?;
    let started = Instant::now();
    let rows = driver.query(&mut ctx, &args.query, &params).await?;
    let columns = rows.columns()?;
    let values = rows.collect_values().await?;
    let stats = driver.stats();

    println!(
      "run {} - {} rows in {:?} (hits so far: {})",
      run,
      values.len(),
      started.elapsed(),
      stats.hits
    );
    if run == 1 {
      print_rows(&columns, &values);
    }
  }

  let stats = driver.stats();
  if args.json {
    println!("{}", serde_json::to_string_pretty(&stats)?);
  } else {
    println!(
      "gets: {}  hits: {}  errors: {}  hit rate: {:.1}%",
      stats.gets,
      stats.hits,
      stats.errors,
      stats.hit_rate() * 100.0
    );
  }

  driver.close().await?;
  Ok(())
}
