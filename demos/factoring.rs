use clap::Parser;

use ggp_rs::compile::compile;
use ggp_rs::factor::find_independent_subgames;
use ggp_rs::games;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of stones for the nim game.
    #[clap(long, value_name = "INT", default_value = "7")]
    stones: i64,
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

    let candidates = [
        ("twin_counters", games::twin_counters()),
        ("tic_tac_toe", games::tic_tac_toe()),
        ("nim", games::nim(args.stones, 3)),
    ];
    for (name, description) in candidates {
        let net = compile(&description)?;
        let factoring = find_independent_subgames(&net);
        println!(
            "{}: {} nodes, {} subgame(s){}",
            name,
            net.len(),
            factoring.len(),
            if factoring.is_degenerate() { " (degenerate)" } else { "" }
        );
        for (i, subgame) in factoring.subgames().iter().enumerate() {
            println!("  subgame {}: {} inputs, {} joint moves", i, subgame.inputs().len(), subgame.joint_move_count());
            for (role, moves) in subgame.role_moves().iter().enumerate() {
                let moves: Vec<String> = moves
                    .iter()
                    .map(|m| m.as_ref().map_or("<null>".to_string(), |m| m.to_string()))
                    .collect();
                println!("    role {}: {}", role, moves.join(", "));
            }
        }
    }

    Ok(())
}
