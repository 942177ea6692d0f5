use std::path::Path;

use anyhow::{bail, Context, Result};
use env_logger::Env;

use minidb::btree::Btree;
use minidb::node::NodeKind;

// Small driver so the engine can be poked at from the command line
// without a separate project using the lib.
fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = std::env::args().collect::<Vec<_>>();
    match args.len() {
        0 | 1 => bail!("Missing <database path> and <command>"),
        2 => bail!("Missing <command>"),
        _ => {}
    }

    let mut btree = Btree::open(Path::new(&args[1]))?;

    let command = &args[2];
    match command.as_str() {
        ".info" => {
            println!("page size: {}", btree.page_size());
            println!("pages: {}", btree.n_pages());
        }
        ".insert" => {
            // row goes into the default table rooted at page 1
            let key = parse_key(&args, 3)?;
            let value = args.get(4).map(String::as_str).unwrap_or("");
            btree.insert_in_table(1, key, value.as_bytes())?;
            println!("inserted {key}");
        }
        ".find" => {
            let key = parse_key(&args, 3)?;
            let data = btree.find(1, key)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        ".icreate" => {
            let nroot = btree.new_node(NodeKind::IndexLeaf)?;
            println!("index root at page {nroot}");
        }
        ".iinsert" => {
            let nroot = parse_key(&args, 3)?;
            let idx_key = parse_key(&args, 4)?;
            let pk_key = parse_key(&args, 5)?;
            btree.insert_in_index(nroot, idx_key, pk_key)?;
            println!("indexed {idx_key} -> {pk_key}");
        }
        ".ifind" => {
            let nroot = parse_key(&args, 3)?;
            let idx_key = parse_key(&args, 4)?;
            let data = btree.find(nroot, idx_key)?;
            let pk_key = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            println!("{pk_key}");
        }
        _ => bail!("Unknown command: {command}"),
    }

    btree.close()?;
    Ok(())
}

fn parse_key(args: &[String], n: usize) -> Result<u32> {
    args.get(n)
        .with_context(|| format!("missing argument {n}"))?
        .parse()
        .context("argument must be an unsigned integer")
}
