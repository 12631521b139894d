use anyhow::Context as _;
use clap::{Parser, Subcommand};
use ember_common::{ByteReader, ByteWriter, ClassId, CoreConfig, LogOutput};
use ember_ecs::{CoreContext, MessageId, MessagePayload};
use ember_kernel::Handle;
use ember_persist::{Snapshot, SnapshotStore};
use ember_tools::ObjectInspector;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const MOVER: ClassId = ClassId(2001);
const SENSOR: ClassId = ClassId(2002);
const RENDERER: ClassId = ClassId(2003);

#[derive(Parser)]
#[command(name = "ember-cli", about = "CLI tool for ember object populations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered classes
    Classes,
    /// Build a population, broadcast a message and round-trip it in memory
    Demo {
        /// Number of game objects to create
        #[arg(short, long, default_value = "3")]
        game_objects: usize,
    },
    /// Build a population and save it to the snapshot store
    Save {
        #[arg(short, long, default_value = "3")]
        game_objects: usize,
        /// Store directory (defaults to <root_path>/store)
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
    /// Restore a snapshot from the store and print the population
    Load {
        /// 1-based snapshot index (defaults to the latest)
        #[arg(short, long)]
        index: Option<u32>,
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
    /// Verify the hash chain of the snapshot store
    Verify {
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CoreConfig::default(),
    };
    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Classes => {
            let ctx = build_context(config)?;
            for (id, rtti) in ctx.registry().classes() {
                let base = ctx
                    .registry()
                    .class_name(rtti.base)
                    .unwrap_or("-");
                println!("{id:>6}  {:<12} base={base:<12} size={}", rtti.name, rtti.size);
            }
        }
        Commands::Demo { game_objects } => {
            let ctx = build_context(config)?;
            let owners = populate(&ctx, game_objects)?;

            for owner in &owners {
                ctx.send_message(
                    owner,
                    MOVER,
                    MessageId::TRANSFORM_CHANGED,
                    MessagePayload::Empty,
                )?;
            }
            print!("{}", ctx.manager().dump());
            println!("{}", ObjectInspector::summary(ctx.manager()));

            let mut out = ByteWriter::new();
            let written = ctx.manager().serialize(&mut out)?;
            let bytes = out.into_bytes();

            let copy = build_context(ctx.config().clone())?;
            let restored = copy.manager().deserialize(&mut ByteReader::new(&bytes))?;
            println!(
                "Round trip: wrote {written} objects ({} bytes), restored {}: {}",
                bytes.len(),
                restored.len(),
                if written == restored.len() { "OK" } else { "MISMATCH" }
            );

            drop(owners);
            let report = ctx.shutdown()?;
            println!(
                "Shutdown: released={} still_referenced={}",
                report.released, report.still_referenced
            );
        }
        Commands::Save {
            game_objects,
            store,
        } => {
            let store_path = store_path(&config, store);
            let level = config.snapshot.compression_level;
            let ctx = build_context(config)?;
            let _owners = populate(&ctx, game_objects)?;

            let snapshot = Snapshot::capture(ctx.manager())?;
            let mut store = SnapshotStore::open(&store_path, level)?;
            let index = store.save(&snapshot)?;
            println!(
                "Saved snapshot {index}: objects={} digest={}",
                snapshot.object_count, snapshot.digest
            );
        }
        Commands::Load { index, store } => {
            let store_path = store_path(&config, store);
            let store = SnapshotStore::open(&store_path, config.snapshot.compression_level)?;
            let snapshot = match index {
                Some(index) => store.load(index)?,
                None => store.load_latest()?,
            };
            let ctx = build_context(config)?;
            let _restored = snapshot.restore(ctx.manager())?;
            print!("{}", ctx.manager().dump());
            println!("{}", ObjectInspector::summary(ctx.manager()));
        }
        Commands::Verify { store } => {
            let store_path = store_path(&config, store);
            let store = SnapshotStore::open(&store_path, config.snapshot.compression_level)?;
            store.verify_integrity()?;
            println!(
                "Store {}: {} snapshots, integrity OK",
                store.root().display(),
                store.meta().snapshot_count
            );
        }
    }

    Ok(())
}

fn init_logging(config: &CoreConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.logging.filter)
            .with_context(|| format!("invalid log filter {:?}", config.logging.filter))?
    };
    match config.logging.output {
        LogOutput::Stdout => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogOutput::File => {
            let path = config.file_system.root_path.join(&config.logging.file_name);
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
    }
    Ok(())
}

fn build_context(config: CoreConfig) -> anyhow::Result<CoreContext> {
    let ctx = CoreContext::builder(config)?
        .register_component(MOVER, "Mover")?
        .register_component(SENSOR, "Sensor")?
        .register_component(RENDERER, "Renderer")?
        .on_message(MessageId::TRANSFORM_CHANGED, SENSOR, |receiver, message| {
            tracing::info!(
                sensor = %receiver.instance_id(),
                sender = %message.sender,
                "transform changed"
            );
        })
        .on_message(MessageId::DID_ADD_COMPONENT, RENDERER, |receiver, message| {
            if let MessagePayload::ComponentAdded { class_id, .. } = message.payload {
                tracing::debug!(renderer = %receiver.instance_id(), added = %class_id, "sibling added");
            }
        })
        .init()?;
    Ok(ctx)
}

/// One game object per iteration, each with a renderer, a mover and a sensor.
fn populate(ctx: &CoreContext, game_objects: usize) -> anyhow::Result<Vec<Handle>> {
    let mut owners = Vec::with_capacity(game_objects);
    for _ in 0..game_objects {
        let owner = ctx.create(ClassId::GAME_OBJECT)?;
        for class in [RENDERER, MOVER, SENSOR] {
            ctx.add_component(&owner, ctx.create(class)?)?;
        }
        owners.push(owner);
    }
    Ok(owners)
}

fn store_path(config: &CoreConfig, store: Option<PathBuf>) -> PathBuf {
    store.unwrap_or_else(|| config.file_system.root_path.join("store"))
}
