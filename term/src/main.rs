use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::SeedableRng;

use mpath_base::base::RNG;
use mpath_base::config::Config;
use mpath_base::game::Board;

const DEFAULT_MAP: &str = "\
##################\n\
#........#.......#\n\
#.g..r...+...@...#\n\
#........#.......#\n\
#..j.j...####+####\n\
#...........~ww..#\n\
#..s.....b..~ww.>#\n\
##################\n";

#[derive(Parser)]
#[command(about = "Runs monster movement on an ASCII map and prints each turn")]
struct Args {
    // ASCII map; a small built-in map is used if omitted.
    #[arg(long)]
    map: Option<PathBuf>,

    // TOML file overriding any subset of the tuning knobs.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    turns: usize,

    #[arg(long, default_value_t = 17)]
    seed: u64,

    // Print only the final board.
    #[arg(long)]
    quiet: bool,
}

fn load(args: &Args) -> Result<Board> {
    let config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Config::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Config::default(),
    };
    let map = match &args.map {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading map {}", path.display()))?,
        None => DEFAULT_MAP.to_string(),
    };
    Ok(Board::parse(&map, config)?)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut board = load(&args)?;
    let mut rng = RNG::seed_from_u64(args.seed);
    info!("Loaded a board with {} monsters", board.monsters().len());

    for turn in 0..args.turns {
        board.update(&mut rng);
        if args.quiet { continue; }
        println!("Turn: {}", turn + 1);
        println!("{}", board.render());
    }
    if args.quiet { println!("{}", board.render()); }
    Ok(())
}
