use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};

use ggp_rs::ast::Description;
use ggp_rs::eval::PropnetMachine;
use ggp_rs::factor::find_independent_subgames;
use ggp_rs::games;
use ggp_rs::machine::{PerceptMachine, StateMachine};
use ggp_rs::search::{
    Deadline, DepthPolicy, FactoredMcts, Heuristic, HypothesisSearch, Legal, LogObserver, Mcts, MctsConfig, Minimax,
    MinimaxConfig, Player, PlayerConfig, Random, Strategy, ThreadedMcts,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Game {
    Counting,
    Nim,
    TicTacToe,
    TwinCounters,
    ZeroSumTree,
    HiddenCoin,
}

impl Game {
    fn description(self) -> Description {
        match self {
            Game::Counting => games::counting(10),
            Game::Nim => games::nim(11, 3),
            Game::TicTacToe => games::tic_tac_toe(),
            Game::TwinCounters => games::twin_counters(),
            Game::ZeroSumTree => games::zero_sum_tree(),
            Game::HiddenCoin => games::hidden_coin(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Engine {
    Legal,
    Random,
    Minimax,
    Mcts,
    Threaded,
    Factored,
    Hypothesis,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Game to play.
    #[arg(value_enum, default_value = "tic-tac-toe")]
    game: Game,

    /// Engine per role, in role order; the last one fills the remaining roles.
    #[clap(long, value_enum, value_delimiter = ',', default_value = "minimax,mcts")]
    engines: Vec<Engine>,

    /// Time per move (in milliseconds).
    #[clap(long, value_name = "MS", default_value = "500")]
    move_time: u64,

    /// Time for the meta game (in milliseconds).
    #[clap(long, value_name = "MS", default_value = "200")]
    start_time: u64,

    /// Safety margin kept back from every deadline (in milliseconds).
    #[clap(long, value_name = "MS", default_value = "50")]
    margin: u64,

    /// Worker threads for the threaded engine.
    #[clap(long, value_name = "INT", default_value = "4")]
    workers: usize,

    /// Nodes the minimax engine may expand per move; unlimited if not given.
    #[clap(long, value_name = "INT")]
    node_budget: Option<u64>,

    /// Random seed.
    #[clap(long, value_name = "INT")]
    seed: Option<u64>,
}

fn strategy(engine: Engine, machine: &PropnetMachine, args: &Cli) -> Box<dyn Strategy<PropnetMachine> + Send> {
    let mut mcts = MctsConfig::default().with_workers(args.workers);
    if let Some(seed) = args.seed {
        mcts = mcts.with_seed(seed);
    }
    match engine {
        Engine::Legal => Box::new(Legal),
        Engine::Random => Box::new(Random::new(args.seed.unwrap_or(0))),
        Engine::Minimax => {
            let mut config = MinimaxConfig::default().with_seed(args.seed.unwrap_or(0));
            if let Some(budget) = args.node_budget {
                config = config.with_depth(DepthPolicy::NodeBudget(budget));
            }
            Box::new(Minimax::new(
                config,
                Heuristic::Weighted(vec![(0.7, Heuristic::GoalProximity), (0.3, Heuristic::Mobility)]),
            ))
        }
        Engine::Mcts => Box::new(Mcts::new(mcts)),
        Engine::Threaded => Box::new(ThreadedMcts::new(mcts)),
        Engine::Factored => Box::new(FactoredMcts::new(find_independent_subgames(machine.propnet()), mcts)),
        Engine::Hypothesis => Box::new(HypothesisSearch::<PropnetMachine>::new(mcts)),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let machine = PropnetMachine::from_description(&args.game.description())?;
    println!("propnet: {} nodes", machine.propnet().len());

    let config = PlayerConfig::default().with_safety_margin(Duration::from_millis(args.margin));
    let mut players = Vec::new();
    for (i, role) in machine.roles().iter().enumerate() {
        let engine = args.engines.get(i).or(args.engines.last()).copied().unwrap_or(Engine::Legal);
        println!("{} plays {:?}", role, engine);
        let mut player = Player::new(machine.clone(), role.clone(), strategy(engine, &machine, &args))
            .with_config(config.clone());
        player.add_observer(Box::new(LogObserver));
        players.push(player);
    }

    let deadline = Deadline::after(Duration::from_millis(args.start_time));
    for player in &mut players {
        player.meta_game(deadline)?;
    }

    let mut state = machine.initial_state();
    let mut turn = 0;
    while !machine.is_terminal(&state) {
        turn += 1;
        let deadline = Deadline::after(Duration::from_millis(args.move_time));
        let mut joint = Vec::with_capacity(players.len());
        for player in &mut players {
            joint.push(player.select_move(deadline)?);
        }
        println!(
            "turn {}: {}",
            turn,
            joint.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" ")
        );
        state = machine.perform(&state, &joint)?;
        for player in &mut players {
            player.play(&joint)?;
            player.perceive(&machine.percepts(&state, player.role()));
        }
    }

    println!("final state: {}", state_text(&machine, &state));
    for (role, goal) in machine.roles().iter().zip(machine.goals(&state)?) {
        println!("{}: {}", role, goal);
    }

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}

fn state_text(machine: &PropnetMachine, state: &ggp_rs::state::State) -> String {
    machine
        .state_sentences(state)
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
