use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use pharmakon_core::{
    AnyState, Method, MinimalState, MultiDomainState, RefinedState, StateRecord, Trajectory,
    classify_position, classify_refined_position, classify_triangle_position,
    compute_interactions, compute_refined_interactions, detect_flags, narrative_risk,
    recommend_debiasing, simulate_with_weights,
};
use pharmakon_store::config::CONFIG_FILE;
use pharmakon_store::{Config, Store, default_base_dir, load_any_file, save_state_file};

#[derive(Parser)]
#[command(name = "pharmakon", about = "PHARMAKON epistemic position model")]
struct Cli {
    /// Config file (TOML, or a JSON weights file)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a minimal (S, H, B) state
    Classify {
        /// Self/identity boundary
        #[arg(short, long, default_value_t = 0.5)]
        identity: f64,
        /// Available energy
        #[arg(short, long, default_value_t = 0.8)]
        energy: f64,
        /// Bias severity
        #[arg(short, long, default_value_t = 0.4)]
        bias: f64,
    },

    /// Classify a refined state with split somatic/cognitive energy
    Refined {
        #[arg(short, long, default_value_t = 0.5)]
        identity: f64,
        #[arg(long, default_value_t = 0.8)]
        somatic: f64,
        #[arg(long, default_value_t = 0.6)]
        cognitive: f64,
        #[arg(short, long, default_value_t = 0.4)]
        bias: f64,
    },

    /// Full assessment of a saved state file of any shape
    Assess {
        path: PathBuf,
    },

    /// Integrate a state file forward in time
    Simulate {
        path: PathBuf,
        /// End time (start is taken from config)
        #[arg(long)]
        t1: Option<f64>,
        /// Number of evenly spaced samples
        #[arg(long, conflicts_with = "adaptive")]
        points: Option<usize>,
        /// Report every accepted step instead of even samples
        #[arg(long)]
        adaptive: bool,
        /// RK45, RK23 or BDF1
        #[arg(long)]
        method: Option<Method>,
        /// Write the final state to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Add a state file to the record log
    Save {
        path: PathBuf,
        /// Label (defaults to the file stem)
        #[arg(long)]
        label: Option<String>,
    },

    /// List logged records
    List,

    /// Export a logged record as a state file
    Export {
        id: String,
        /// Output file path (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Remove a logged record
    Delete {
        id: String,
    },
}

fn data_dir() -> PathBuf {
    std::env::var("PHARMAKON_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(default_base_dir)
}

fn open_store() -> Result<Store> {
    let dir = data_dir();
    Store::open_in_dir(&dir).with_context(|| format!("failed to open store in {}", dir.display()))
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("failed to load {}", path.display()))
        }
        None => Config::load_or_default(&data_dir().join(CONFIG_FILE))
            .context("failed to load config from data dir"),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Classify {
            identity,
            energy,
            bias,
        } => {
            let st = MinimalState::new(*identity, *energy, *bias).context("invalid state")?;
            report_minimal(&cli, &st)
        }
        Commands::Refined {
            identity,
            somatic,
            cognitive,
            bias,
        } => {
            let st = RefinedState::new(*identity, *somatic, *cognitive, *bias)
                .context("invalid state")?;
            report_refined(&cli, &st)
        }
        Commands::Assess { path } => cmd_assess(&cli, path),
        Commands::Simulate {
            path,
            t1,
            points,
            adaptive,
            method,
            out,
        } => cmd_simulate(&cli, path, *t1, *points, *adaptive, *method, out.as_deref()),
        Commands::Save { path, label } => cmd_save(path, label.as_deref()),
        Commands::List => cmd_list(&cli),
        Commands::Export { id, out } => cmd_export(id, out.as_deref()),
        Commands::Delete { id } => cmd_delete(id),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_metrics<'a>(metrics: impl IntoIterator<Item = (&'a str, f64)>) {
    for (name, value) in metrics {
        println!("  {name:<20} {value:.4}");
    }
}

fn report_minimal(cli: &Cli, st: &MinimalState) -> Result<()> {
    let class = classify_position(st);
    let ix = compute_interactions(st);
    if cli.json {
        return print_json(&json!({
            "state": st.to_map(),
            "classification": class,
            "interactions": ix,
        }));
    }
    println!("position: {}", class.position);
    println!("  {}", class.description);
    println!("interactions:");
    print_metrics(ix.to_map());
    Ok(())
}

fn report_refined(cli: &Cli, st: &RefinedState) -> Result<()> {
    let class = classify_refined_position(st);
    let ix = compute_refined_interactions(st);
    if cli.json {
        return print_json(&json!({
            "state": st.to_map(),
            "classification": class,
            "interactions": ix,
        }));
    }
    println!("position: {}", class.position);
    println!("  {}", class.description);
    println!("interactions:");
    print_metrics(ix.to_map());
    Ok(())
}

fn report_multi_domain(cli: &Cli, st: &MultiDomainState, config: &Config) -> Result<()> {
    let composites = config.weights.evaluate_all(st);
    let flags = detect_flags(st, &config.weights, &config.flags);
    let triangle = classify_triangle_position(st, &config.weights);
    let recommendations = recommend_debiasing(triangle.position, st, &config.weights, &config.flags);
    let narrative = narrative_risk(st);

    if cli.json {
        return print_json(&json!({
            "composites": composites,
            "narrative_risk": narrative,
            "flags": flags,
            "triangle": triangle,
            "recommendations": recommendations,
        }));
    }

    println!("composites:");
    print_metrics(composites.iter().map(|(c, v)| (c.as_str(), *v)));
    print_metrics([("narrative_risk", narrative)]);

    let raised = flags.raised();
    if raised.is_empty() {
        println!("flags: none");
    } else {
        let names: Vec<&str> = raised.iter().map(|f| f.as_str()).collect();
        println!("flags: {}", names.join(", "));
    }

    println!("triangle: {}", triangle.position);
    for (position, score) in triangle.scores() {
        println!("  {:<28} {score:.4}", position.as_str());
    }
    if !recommendations.is_empty() {
        println!("recommendations:");
        for line in &recommendations {
            println!("  {line}");
        }
    }
    Ok(())
}

fn cmd_assess(cli: &Cli, path: &Path) -> Result<()> {
    let state =
        load_any_file(path).with_context(|| format!("failed to load {}", path.display()))?;
    match &state {
        AnyState::Minimal(st) => report_minimal(cli, st),
        AnyState::Refined(st) => report_refined(cli, st),
        AnyState::MultiDomain(st) => report_multi_domain(cli, st, &load_config(cli)?),
    }
}

fn cmd_simulate(
    cli: &Cli,
    path: &Path,
    t1: Option<f64>,
    points: Option<usize>,
    adaptive: bool,
    method: Option<Method>,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config(cli)?;
    let mut sim = config.simulation.clone();
    if let Some(t1) = t1 {
        sim.t1 = t1;
    }
    if let Some(n) = points {
        sim = sim.points(n);
    }
    if adaptive {
        sim = sim.adaptive();
    }
    if let Some(m) = method {
        sim = sim.method(m);
    }

    let state =
        load_any_file(path).with_context(|| format!("failed to load {}", path.display()))?;
    match &state {
        AnyState::Minimal(st) => run_simulation(cli, st, &config, &sim, out),
        AnyState::Refined(st) => run_simulation(cli, st, &config, &sim, out),
        AnyState::MultiDomain(st) => run_simulation(cli, st, &config, &sim, out),
    }
}

fn run_simulation<S: StateRecord>(
    cli: &Cli,
    initial: &S,
    config: &Config,
    sim: &pharmakon_core::Simulation,
    out: Option<&Path>,
) -> Result<()> {
    let traj = simulate_with_weights(initial, &config.weights, sim).context("simulation failed")?;
    tracing::info!(
        method = %traj.method(),
        samples = traj.len(),
        accepted = traj.stats().accepted,
        "simulation complete"
    );

    if cli.json {
        print_json(&trajectory_json(&traj)?)?;
    } else {
        print_table(&traj)?;
    }

    if let Some(out) = out {
        let last = traj.final_state().context("empty trajectory")?;
        save_state_file(&last, out)
            .with_context(|| format!("failed to write {}", out.display()))?;
    }
    Ok(())
}

fn trajectory_json<S: StateRecord>(traj: &Trajectory<S>) -> Result<Value> {
    let samples = (0..traj.len())
        .map(|i| traj.values(i).map(<[f64]>::to_vec))
        .collect::<pharmakon_core::Result<Vec<_>>>()?;
    Ok(json!({
        "method": traj.method(),
        "names": traj.names(),
        "times": traj.times(),
        "samples": samples,
        "stats": traj.stats(),
    }))
}

/// Comma-separated: time column, then one column per variable.
fn print_table<S: StateRecord>(traj: &Trajectory<S>) -> Result<()> {
    println!("t,{}", traj.names().join(","));
    for (i, t) in traj.times().iter().enumerate() {
        let row: Vec<String> = traj.values(i)?.iter().map(|v| format!("{v:.6}")).collect();
        println!("{t:.6},{}", row.join(","));
    }
    Ok(())
}

fn cmd_save(path: &Path, label: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let label = label
        .map(str::to_string)
        .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .unwrap_or_default();
    let id = store
        .import_state_file(&label, path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    println!("{id}");
    Ok(())
}

fn cmd_list(cli: &Cli) -> Result<()> {
    let store = open_store()?;
    let records = store.list_records().context("failed to list records")?;
    if cli.json {
        return print_json(&serde_json::to_value(&records)?);
    }
    if records.is_empty() {
        println!("(no records)");
    }
    for r in &records {
        println!("{}  {:<12} {}  {}", r.id, r.shape.as_str(), r.created_at, r.label);
    }
    Ok(())
}

fn cmd_export(id: &str, out: Option<&Path>) -> Result<()> {
    let store = open_store()?;
    match out {
        Some(path) => {
            store
                .export_record_file(id, path)
                .with_context(|| format!("failed to export {id}"))?;
            println!("exported {id} to {}", path.display());
        }
        None => {
            let json = store
                .export_record_json(id)
                .with_context(|| format!("failed to export {id}"))?;
            println!("{json}");
        }
    }
    Ok(())
}

fn cmd_delete(id: &str) -> Result<()> {
    let store = open_store()?;
    store
        .delete_record(id)
        .with_context(|| format!("failed to delete {id}"))?;
    println!("deleted {id}");
    Ok(())
}
