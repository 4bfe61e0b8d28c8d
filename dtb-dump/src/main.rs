//! Command-line tool for inspecting Device Tree Blob (DTB) files.
//!
//! Reads a DTB file, parses it with the `dtb_tree` library, and writes a
//! DTS-style text rendering of the tree. A node path may be given to
//! print a single subtree plus its counts instead.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use dtb_tree::DtbTree;
use log::error;

/// Command-line arguments for the DTB dump tool.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the input DTB file
    #[arg(short, long)]
    input: String,

    /// Path to the output text file (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// Only dump the node at this path (e.g. "/soc/serial")
    #[arg(short, long)]
    node: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let data = match std::fs::read(&args.input) {
        Ok(data) => data,
        Err(err) => {
            error!("cannot read {}: {}", args.input, err);
            return ExitCode::FAILURE;
        }
    };

    let tree = match DtbTree::from_bytes(&data) {
        Ok(tree) => tree,
        Err(err) => {
            error!("cannot parse {}: {}", args.input, err);
            return ExitCode::FAILURE;
        }
    };

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => match std::fs::File::create(path) {
            Ok(file) => Box::new(file),
            Err(err) => {
                error!("cannot create {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(std::io::stdout()),
    };

    let result = match &args.node {
        Some(path) => dump_node(&mut out, &tree, path),
        None => write!(out, "{}", tree),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("write failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Prints one node: its counts, properties, and direct children.
fn dump_node(out: &mut dyn Write, tree: &DtbTree, path: &str) -> std::io::Result<()> {
    let Some(node) = tree.find(path) else {
        writeln!(out, "no node at {:?}", path)?;
        return Ok(());
    };

    let stat = node.stat();
    writeln!(
        out,
        "{}: {} children, {} properties, {} siblings",
        node.path(),
        stat.child_count,
        stat.prop_count,
        stat.sibling_count
    )?;
    for prop in node.properties() {
        writeln!(out, "    {};", prop)?;
    }
    for child in node.children() {
        writeln!(out, "    {} {{ ... }};", child.name())?;
    }
    Ok(())
}
