//! gusd CLI - Inspect stage files, run traversals and unpack packed prims.

use gusd::core::{DefaultArray, PrimPath, PurposeSet, TimeCode};
use gusd::geom::{AttribOwner, Detail};
use gusd::packed::PackedUsdBuilder;
use gusd::parms::ParmMap;
use gusd::stage::{Prim, StageRef};
use gusd::traverse::NO_TRAVERSE_NAME;
use gusd::unpack::{traverse_for_unpack, TraverseRequest, UnpackUsd};
use gusd::{Config, Context, Diagnostics, Result, Severity};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter, e.g. `gusd=debug`.
const LOG_ENV: &str = "GUSD_LOG";

/// Options shared by the commands.
#[derive(Default)]
struct Opts<'a> {
    config: Option<&'a str>,
    traversal: Option<&'a str>,
    time: f64,
    purposes: Option<&'a str>,
    polygons: bool,
    keep_old: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level: Option<&str> = None;
    let mut opts = Opts::default();
    let mut positional: Vec<&str> = Vec::new();
    let mut iter = args[1..].iter().map(String::as_str);
    while let Some(arg) = iter.next() {
        match arg {
            "-v" | "--verbose" => level = Some("debug"),
            "-vv" | "--trace" => level = Some("trace"),
            "-q" | "--quiet" => level = Some("off"),
            "-c" | "--config" => opts.config = iter.next(),
            "-t" | "--traversal" => opts.traversal = iter.next(),
            "-p" | "--purpose" => opts.purposes = iter.next(),
            "--polygons" => opts.polygons = true,
            "--keep" => opts.keep_old = true,
            "-f" | "--time" => match iter.next().map(str::parse::<f64>) {
                Some(Ok(t)) => opts.time = t,
                _ => fail("--time expects a number"),
            },
            _ => positional.push(arg),
        }
    }
    init_logging(level);

    if positional.is_empty() {
        print_help();
        return;
    }

    let config = match Config::load(opts.config.map(Path::new)) {
        Ok(c) => c,
        Err(e) => fail(&format!("Failed to load config: {e}")),
    };
    let ctx = Context::from_config(&config);

    let result = match positional[0] {
        "info" | "i" => cmd_info(&ctx, &config, require_file(&positional, "info")),
        "tree" | "t" => cmd_tree(&ctx, &config, require_file(&positional, "tree")),
        "traverse" | "tr" => cmd_traverse(
            &ctx,
            &config,
            require_file(&positional, "traverse"),
            positional.get(2).copied(),
            &opts,
        ),
        "unpack" | "u" => cmd_unpack(
            &ctx,
            &config,
            require_file(&positional, "unpack"),
            positional.get(2).copied(),
            &opts,
        ),
        "traversals" | "ls" => {
            cmd_traversals(&ctx, &config);
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other if other.ends_with(".json") || other.ends_with(".usd") => cmd_info(&ctx, &config, other),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        fail(&e.to_string());
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn require_file<'a>(args: &[&'a str], command: &str) -> &'a str {
    match args.get(1) {
        Some(&file) => file,
        None => {
            eprintln!("Error: missing file argument");
            eprintln!("Usage: gusd {command} <stage.json>");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("gusd - packed USD toolkit");
    println!();
    println!("USAGE:");
    println!("    gusd [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info      <file>            Show prim counts by type");
    println!("    t, tree      <file>            Show the prim hierarchy");
    println!("    tr, traverse <file> [root]     Run a traversal and list the selected prims");
    println!("    u, unpack    <file> [root]     Pack the root, unpack it and list the result");
    println!("    ls, traversals                 List registered traversals");
    println!("    h, help                        Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <file>      Config file (default: $GUSD_CONFIG or the user config dir)");
    println!("    -t, --traversal <name>   Traversal to run (default from config)");
    println!("    -f, --time <frame>       Frame to evaluate at (default 0)");
    println!("    -p, --purpose <list>     Comma separated purposes (default,proxy,render,guide)");
    println!("    --polygons               Unpack to polygons instead of packed prims");
    println!("    --keep                   Keep the source packed prim when unpacking");
    println!("    -v, --verbose            Show debug output");
    println!("    -vv, --trace             Show trace output (very verbose)");
    println!("    -q, --quiet              Suppress all log output");
    println!();
    println!("EXAMPLES:");
    println!("    gusd info shot.json");
    println!("    gusd traverse shot.json /world -t std:components");
    println!("    gusd unpack shot.json /world --polygons -f 12");
    println!();
    println!("NOTES:");
    println!("    - Passing a stage file directly is equivalent to 'info'");
    println!("    - {LOG_ENV} takes a tracing filter when no verbosity flag is given");
}

fn open_stage(ctx: &Context, config: &Config, file: &str) -> Result<StageRef> {
    ctx.stage_cache().find_or_open(file, &config.stage_opts(), &Default::default())
}

fn root_prim(stage: &StageRef, root: Option<&str>) -> Result<Prim> {
    let path = PrimPath::new(root.unwrap_or("/"))?;
    Prim::at_path(stage, &path).ok_or_else(|| gusd::Error::PrimNotFound {
        file: stage.identifier().to_string(),
        path: path.to_string(),
    })
}

fn report(diagnostics: &Diagnostics) {
    for d in diagnostics.take() {
        match d.severity {
            Severity::Message => eprintln!("note: {}", d.message),
            Severity::Warning => eprintln!("warning: {}", d.message),
            Severity::Error => eprintln!("error: {}", d.message),
        }
    }
}

fn cmd_info(ctx: &Context, config: &Config, file: &str) -> Result<()> {
    let stage = open_stage(ctx, config, file)?;
    tracing::debug!(file, prims = stage.prim_count(), "stage opened");

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut stack = vec![Prim::pseudo_root(&stage)];
    while let Some(prim) = stack.pop() {
        if !prim.is_pseudo_root() {
            *counts.entry(format!("{:?}", prim.prim_type())).or_default() += 1;
        }
        stack.extend(prim.children());
    }

    println!("Stage: {file}");
    println!("Payloads: {}", if stage.opts().load_all { "loaded" } else { "unloaded" });
    println!("Masters: {}", stage.master_ids().len());
    println!();
    println!("Prims:");
    for (kind, n) in &counts {
        println!("  {kind:<12} {n}");
    }
    println!();
    println!("Total prims: {}", counts.values().sum::<usize>());
    Ok(())
}

fn cmd_tree(ctx: &Context, config: &Config, file: &str) -> Result<()> {
    let stage = open_stage(ctx, config, file)?;
    fn walk(prim: &Prim, depth: usize) {
        let kind = prim.kind().map(|k| format!(" [{k:?}]")).unwrap_or_default();
        println!("{}{} ({}){}", "  ".repeat(depth), prim.name(), prim.type_name(), kind);
        for child in prim.children() {
            walk(&child, depth + 1);
        }
    }
    for top in Prim::pseudo_root(&stage).children() {
        walk(&top, 0);
    }
    Ok(())
}

fn cmd_traverse(ctx: &Context, config: &Config, file: &str, root: Option<&str>, opts: &Opts) -> Result<()> {
    let stage = open_stage(ctx, config, file)?;
    let roots = vec![Some(root_prim(&stage, root)?)];
    let times = DefaultArray::new(TimeCode::from_numeric(opts.time));
    let purposes = DefaultArray::new(purpose_set(opts));
    let name = opts.traversal.unwrap_or(&config.default_traversal);

    let diagnostics = Diagnostics::new();
    let request = TraverseRequest { roots: &roots, times: &times, purposes: &purposes };
    let found = traverse_for_unpack(
        ctx.traversals(),
        name,
        &request,
        opts.polygons,
        &ParmMap::new(),
        opts.time,
        &diagnostics,
    );
    report(&diagnostics);
    let found = found?;

    for (prim, _) in &found {
        println!("{}  {}", prim.path(), prim.type_name());
    }
    tracing::info!(traversal = name, count = found.len(), "traversal finished");
    Ok(())
}

fn cmd_unpack(ctx: &Context, config: &Config, file: &str, root: Option<&str>, opts: &Opts) -> Result<()> {
    let path = PrimPath::new(root.unwrap_or("/"))?;
    let diagnostics = Diagnostics::new();

    let mut input = Detail::new();
    PackedUsdBuilder::new(file, path)
        .frame(TimeCode::from_numeric(opts.time))
        .purposes(purpose_set(opts))
        .build(&mut input, ctx.stage_cache(), &diagnostics);

    let parms = ParmMap::new()
        .with("unpack_traversal", opts.traversal.unwrap_or(&config.default_traversal))
        .with("unpack_geomtype", if opts.polygons { "polygons" } else { "packedprims" })
        .with("unpack_delold", !opts.keep_old)
        .with("import_primvars", config.refine.primvar_pattern.as_str())
        .with("nontransformingprimvars", config.refine.non_transforming_pattern.as_str())
        .with("translatesttouv", config.refine.translate_st_to_uv);
    let out = UnpackUsd::new(ctx).cook(&input, &parms, opts.time, &diagnostics);
    report(&diagnostics);
    let out = out?;

    println!("Points: {}", out.num_points());
    println!("Primitives: {}", out.num_primitives());
    let names = out.find_attrib(AttribOwner::Primitive, "name");
    let paths = out.find_attrib(AttribOwner::Primitive, "path");
    for i in 0..out.num_primitives() {
        let name = names.and_then(|a| a.get_string(i)).unwrap_or("-");
        let path = paths.and_then(|a| a.get_string(i)).unwrap_or("-");
        println!("  [{i}] {name}  {path}");
    }
    Ok(())
}

fn cmd_traversals(ctx: &Context, config: &Config) {
    for (name, label) in ctx.traversals().menu() {
        let marker = if name == config.default_traversal && name != NO_TRAVERSE_NAME { " (default)" } else { "" };
        println!("{name:<24} {label}{marker}");
    }
}

fn purpose_set(opts: &Opts) -> PurposeSet {
    match opts.purposes {
        Some(list) => {
            let names: Vec<&str> = list.split(',').map(str::trim).collect();
            PurposeSet::from_names(&names)
        }
        None => PurposeSet::default(),
    }
}
