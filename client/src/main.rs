use anyhow::{ensure, Context};
use clap::{Args, Parser, Subcommand};
use hotornot_core::{
    filter::Range, Db, Elo, EngineConfig, Entity, EntityId, EntityKind, EntityRepository, Filter,
    Gender, Mode, Session,
};
use hotornot_stash::StashClient;
use std::{
    env, fs,
    path::{Path, PathBuf},
    process::exit,
    time::Duration,
};
use tracing_subscriber::EnvFilter;
use url::Url;

mod backend;
mod rank;
mod render;

use backend::Backend;
use render::Terminal;

/// Hot or not: rank your library by choosing between two items at a time.
///
/// Ranks a local library by default, or a Stash server's library with --stash-url.
#[derive(Parser)]
struct Options {
    /// Local library and match statistics.
    #[clap(short, long, env = "HOTORNOT_DB")]
    db: Option<PathBuf>,

    /// Root URL of a Stash server whose library should be ranked.
    #[clap(short = 'u', long, env = "HOTORNOT_STASH_URL")]
    stash_url: Option<Url>,

    /// Stash API key, if the server requires one.
    #[clap(long, env = "HOTORNOT_API_KEY", requires = "stash_url")]
    api_key: Option<String>,

    /// Seconds to wait for a response from Stash.
    #[clap(long, env = "HOTORNOT_STASH_TIMEOUT", default_value = "30")]
    stash_timeout: u64,

    /// Kind of item to rank: performer, scene or image.
    #[clap(short, long, env = "HOTORNOT_KIND", default_value = "performer")]
    kind: EntityKind,

    #[clap(subcommand)]
    command: Command,
}

impl Options {
    async fn db(&self) -> anyhow::Result<Db> {
        let db_path = match &self.db {
            Some(path) => path,
            None => &Path::new(&env::var("HOME")?).join(".hotornot/library.sqlite"),
        };
        if let Some(dir) = db_path.parent() {
            fs::create_dir_all(dir).context(format!("creating {}", dir.display()))?;
        }
        Db::open(db_path).await
    }

    fn backend(&self, db: &Db) -> anyhow::Result<Backend> {
        let Some(url) = &self.stash_url else {
            return Ok(Backend::Local(db.library(self.kind)));
        };
        let mut stash = StashClient::new(url, self.kind)?
            .with_timeout(Duration::from_secs(self.stash_timeout));
        if let Some(api_key) = &self.api_key {
            stash = stash.with_api_key(api_key);
        }
        Ok(Backend::Stash(stash))
    }
}

/// Which items take part in a ranking session.
#[derive(Args)]
struct FilterOptions {
    /// Only include these genders (performers only). Defaults to female.
    #[clap(short, long = "gender")]
    genders: Vec<Gender>,

    /// Include performers of any gender.
    #[clap(long, conflicts_with = "genders")]
    any_gender: bool,

    #[clap(long)]
    ethnicity: Option<String>,

    #[clap(long)]
    country: Option<String>,

    #[clap(long)]
    min_age: Option<i32>,

    #[clap(long)]
    max_age: Option<i32>,

    #[clap(long)]
    min_rating: Option<i32>,

    #[clap(long)]
    max_rating: Option<i32>,

    /// Only include items whose name contains this text.
    #[clap(long)]
    name: Option<String>,

    /// Include items without an image.
    #[clap(long)]
    allow_missing_image: bool,
}

impl FilterOptions {
    fn filter(&self) -> Filter {
        let mut filter = Filter {
            ethnicity: self.ethnicity.clone(),
            country: self.country.clone(),
            age: Range::new(self.min_age, self.max_age),
            rating: Range::new(self.min_rating, self.max_rating),
            name: self.name.clone(),
            image_required: !self.allow_missing_image,
            ..Default::default()
        };
        if self.any_gender {
            filter.genders.clear();
        } else if !self.genders.is_empty() {
            filter.genders = self.genders.iter().copied().collect();
        }
        filter
    }
}

/// Tunables for pairing and rating.
#[derive(Args)]
struct EngineOptions {
    /// Largest rating change a single match can cause.
    #[clap(long, env = "HOTORNOT_K_FACTOR", default_value = "8")]
    k_factor: f64,

    /// Largest rating gap between Swiss opponents, unless nobody is that close.
    #[clap(long, env = "HOTORNOT_SWISS_WINDOW", default_value = "15")]
    swiss_window: i32,

    /// Pair Swiss matches from a random sample when more items than this match the filter.
    #[clap(long, env = "HOTORNOT_RANKED_POOL_LIMIT")]
    ranked_pool_limit: Option<usize>,
}

impl EngineOptions {
    fn config(&self) -> anyhow::Result<EngineConfig> {
        ensure!(self.k_factor > 0.0, "k factor must be positive");
        ensure!(self.swiss_window >= 0, "Swiss window must not be negative");
        Ok(EngineConfig {
            elo: Elo {
                k_factor: self.k_factor,
                ..Default::default()
            },
            swiss_window: self.swiss_window,
            ranked_pool_limit: self.ranked_pool_limit,
        })
    }
}

#[derive(Subcommand)]
enum Command {
    /// Compare items interactively.
    Rank {
        /// Comparison mode: swiss, gauntlet or champion.
        #[clap(short, long, env = "HOTORNOT_MODE", default_value = "swiss")]
        mode: Mode,

        #[clap(flatten)]
        filter: FilterOptions,

        #[clap(flatten)]
        engine: EngineOptions,
    },

    /// Load items into the local library from a JSON array.
    Import { path: PathBuf },

    /// Show the highest rated items.
    Top {
        #[clap(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Show match statistics for an item.
    Stats { id: EntityId },
}

impl Command {
    async fn run(&self, opt: &Options, db: &Db) -> anyhow::Result<()> {
        match self {
            Self::Rank {
                mode,
                filter,
                engine,
            } => {
                let session = Session::new(opt.backend(db)?, Terminal, *mode, engine.config()?)
                    .with_stats(db.library(opt.kind))
                    .with_filter(filter.filter());
                rank::run(session).await?;
            }
            Self::Import { path } => {
                let json = fs::read(path).context(format!("reading {}", path.display()))?;
                let entities: Vec<Entity> = serde_json::from_slice(&json)
                    .context(format!("parsing {}", path.display()))?;
                let count = db.import(opt.kind, &entities).await?;
                println!("imported {count} {}(s)", opt.kind);
            }
            Self::Top { count } => {
                let entities = opt
                    .backend(db)?
                    .list_sorted(&Filter::any(), Some(*count))
                    .await?;
                println!("{}", render::top_table(&entities));
            }
            Self::Stats { id } => {
                let stats = db
                    .library(opt.kind)
                    .stats(id)
                    .await?
                    .context(format!("no matches recorded for {} {id}", opt.kind))?;
                println!("{}", render::stats_table(id, &stats));
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();
    let opt = Options::parse();

    let db = match opt.db().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("failed to open local database: {err:#}");
            exit(1);
        }
    };

    if let Err(err) = opt.command.run(&opt, &db).await {
        eprintln!("{err:#}");
        exit(1);
    }
}
