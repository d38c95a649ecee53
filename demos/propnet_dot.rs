use std::fs::File;
use std::io::Write;

use clap::Parser;

use ggp_rs::compile::compile;
use ggp_rs::dot::{to_dot, DotConfig};
use ggp_rs::games;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Output file.
    #[arg(value_name = "FILE", default_value = "propnet.dot")]
    output: String,

    /// Game to draw: counting, nim, tic-tac-toe, twin-counters, zero-sum-tree or hidden-coin.
    #[clap(long, default_value = "twin-counters")]
    game: String,

    /// Show constant nodes.
    #[clap(long)]
    constants: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let description = match args.game.as_str() {
        "counting" => games::counting(3),
        "nim" => games::nim(4, 2),
        "tic-tac-toe" => games::tic_tac_toe(),
        "twin-counters" => games::twin_counters(),
        "zero-sum-tree" => games::zero_sum_tree(),
        "hidden-coin" => games::hidden_coin(),
        other => color_eyre::eyre::bail!("unknown game: {}", other),
    };

    let net = compile(&description)?;
    println!("propnet: {} nodes", net.len());

    let config = DotConfig::default().with_constants(args.constants);
    let dot = to_dot(&net, &config)?;
    let mut file = File::create(&args.output)?;
    file.write_all(dot.as_bytes())?;
    println!("Wrote {}", args.output);
    println!("Render with: dot -Tpdf {} -O", args.output);

    Ok(())
}
