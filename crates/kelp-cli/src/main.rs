use clap::{Parser, Subcommand};
use kelp_exp::{read, DataScope, ElKind, Env, ExpError, Prog, Registry, Tree, Val};
use kelp_types::Type;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kelp", about = "Resolve and evaluate typed kelp expressions")]
struct Cli {
    /// Log resolution steps to stderr (overrides KELP_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct Input {
    /// Source file (reads stdin when neither a file nor --expr is given)
    file: Option<PathBuf>,
    /// Source text given inline
    #[arg(short, long, conflicts_with = "file")]
    expr: Option<String>,
    /// Dict literal exposed to `.path` and `/path` lookups, e.g. '{a:1}'
    #[arg(long)]
    data: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a type and print its canonical notation
    Type {
        /// Type notation, e.g. 'list|int' or '(obj "point" +x +y int)'
        typ: String,
    },
    /// Resolve expressions and print each result with its type
    Resolve {
        #[command(flatten)]
        input: Input,
        /// Leave unresolved parts in place and print the residual
        #[arg(long)]
        partial: bool,
        /// Expected result type
        #[arg(long)]
        hint: Option<String>,
    },
    /// Resolve and evaluate expressions, printing each value
    Eval {
        #[command(flatten)]
        input: Input,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("KELP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", msg);
    std::process::exit(1);
}

fn read_source(input: &Input) -> String {
    if let Some(expr) = &input.expr {
        return expr.clone();
    }
    match &input.file {
        Some(file) => match std::fs::read_to_string(file) {
            Ok(s) => s,
            Err(e) => fail(format_args!("could not read {}: {}", file.display(), e)),
        },
        None => {
            let mut source = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut source) {
                fail(format_args!("could not read stdin: {}", e));
            }
            source
        }
    }
}

fn parse_type(src: &str) -> Type {
    Type::parse(src).unwrap_or_else(|e| fail(format_args!("bad type `{}`: {}", src, e)))
}

/// The `--data` argument must read as a single dict literal.
fn parse_data(src: &str) -> Val {
    let mut tree = Tree::new();
    let ids = read(&mut tree, src).unwrap_or_else(|e| fail(format_args!("bad data: {}", e)));
    match ids.as_slice() {
        [id] => match &tree[*id].kind {
            ElKind::Atom(val @ Val::Dict(_)) => val.clone(),
            _ => fail("data must be a dict literal"),
        },
        _ => fail("data must be a single dict literal"),
    }
}

/// Unresolved errors only carry an element id; show the element itself.
fn report(p: &Prog<'_>, e: ExpError) -> ! {
    match e {
        ExpError::Unresolved { el } => fail(format_args!(
            "[{}] unresolved element {}",
            p.tree.span(el),
            p.tree.display(el)
        )),
        e => fail(e),
    }
}

fn resolve(env: &dyn Env, reg: &Registry, source: &str, partial: bool, hint: &Type) {
    let mut p = if partial {
        Prog::partial(reg)
    } else {
        Prog::new(reg)
    };
    let ids = read(&mut p.tree, source).unwrap_or_else(|e| fail(e));
    for id in ids {
        debug!(form = %p.tree.display(id), partial, "resolving");
        match p.resolve(env, id, hint) {
            Ok(r) => {
                let t = p.type_of(r);
                match p.ctx.realize(&t) {
                    Ok(t) => println!("{} : {}", p.tree.display(r), t),
                    Err(err) => report(
                        &p,
                        ExpError::Type {
                            err,
                            span: p.tree.span(r),
                        },
                    ),
                }
            }
            Err(ExpError::Unresolved { el }) if partial => {
                println!("residual {}", p.tree.display(el));
            }
            Err(e) => report(&p, e),
        }
    }
}

fn eval(env: &dyn Env, reg: &Registry, source: &str) {
    let mut p = Prog::new(reg);
    let ids = read(&mut p.tree, source).unwrap_or_else(|e| fail(e));
    for id in ids {
        debug!(form = %p.tree.display(id), "evaluating");
        match p.run(env, id, &Type::VOID) {
            Ok(val) => println!("{}", val),
            Err(e) => report(&p, e),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Type { typ } => println!("{}", parse_type(&typ)),
        Command::Resolve {
            input,
            partial,
            hint,
        } => {
            let hint = hint.as_deref().map_or(Type::VOID, parse_type);
            let source = read_source(&input);
            let reg = Registry::builtins();
            match input.data.as_deref().map(parse_data) {
                Some(data) => {
                    let scope = DataScope::root(&reg, data);
                    resolve(&scope, &reg, &source, partial, &hint);
                }
                None => resolve(&reg, &reg, &source, partial, &hint),
            }
        }
        Command::Eval { input } => {
            let source = read_source(&input);
            let reg = Registry::builtins();
            match input.data.as_deref().map(parse_data) {
                Some(data) => {
                    let scope = DataScope::root(&reg, data);
                    eval(&scope, &reg, &source);
                }
                None => eval(&reg, &reg, &source),
            }
        }
    }
}
