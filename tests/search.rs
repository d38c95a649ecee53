use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use test_log::test;

use ggp_rs::ast::Term;
use ggp_rs::belief::BeliefTree;
use ggp_rs::eval::PropnetMachine;
use ggp_rs::factor::find_independent_subgames;
use ggp_rs::games;
use ggp_rs::machine::{PerceptMachine, StateMachine};
use ggp_rs::search::{
    Context, Deadline, DepthPolicy, FactoredMcts, Heuristic, Mcts, MctsConfig, Minimax, MinimaxConfig, Player,
    PlayerConfig, SearchClock, Strategy, ThreadedMcts,
};
use ggp_rs::state::{Move, State};

fn long_clock() -> SearchClock {
    SearchClock::new(Deadline::after(Duration::from_secs(60)))
}

fn minimax_choice(machine: &PropnetMachine, role: usize, state: &State, config: MinimaxConfig) -> (Move, f64) {
    let role = machine.roles()[role].clone();
    let mut minimax = Minimax::new(config, Heuristic::GoalProximity);
    let outcome = minimax
        .search(Context::new(machine, &role, state), &mut long_clock())
        .unwrap()
        .unwrap();
    (outcome.choice.mv, outcome.choice.score)
}

#[test]
fn test_alpha_beta_matches_minimax() {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    for description in [games::nim(6, 3), games::zero_sum_tree(), games::tic_tac_toe()] {
        let machine = PropnetMachine::from_description(&description).unwrap();
        // A few positions a couple of plies into the game.
        let mut states = vec![machine.initial_state()];
        for _ in 0..4 {
            let mut state = machine.initial_state();
            for _ in 0..3 {
                if machine.is_terminal(&state) {
                    break;
                }
                state = machine.random_next_state(&state, &mut rng).unwrap();
            }
            states.push(state);
        }
        for state in states.iter().filter(|s| !machine.is_terminal(s)) {
            for role in 0..machine.roles().len() {
                let config = MinimaxConfig::default()
                    .with_depth(DepthPolicy::Fixed(4))
                    .with_stop_on_win(false);
                let pruned = minimax_choice(&machine, role, state, config.clone().with_pruning(true));
                let plain = minimax_choice(&machine, role, state, config.with_pruning(false));
                assert_eq!(pruned, plain);
            }
        }
    }
}

#[test]
fn test_counting_game() {
    let machine = PropnetMachine::from_description(&games::counting(10)).unwrap();
    let (mv, score) = minimax_choice(&machine, 0, &machine.initial_state(), MinimaxConfig::default());
    assert_eq!(mv, Move::new(Term::constant("increment")));
    assert_eq!(score, 100.0);
}

#[test]
fn test_zero_sum_tree() {
    let machine = PropnetMachine::from_description(&games::zero_sum_tree()).unwrap();
    for pruning in [true, false] {
        let config = MinimaxConfig::default()
            .with_depth(DepthPolicy::Exhaustive)
            .with_pruning(pruning);
        let (mv, score) = minimax_choice(&machine, 0, &machine.initial_state(), config);
        assert_eq!(score, 50.0);
        assert_eq!(mv, Move::new(Term::func("pick", [Term::constant("l")])));
    }
}

#[test]
fn test_mcts_converges_on_one_ply_game() {
    let machine = PropnetMachine::from_description(&games::one_ply_choice()).unwrap();
    let role = machine.roles()[0].clone();
    let state = machine.initial_state();
    for seed in 0..5 {
        let mut mcts = Mcts::new(MctsConfig::default().with_seed(seed).with_max_samples(100));
        let choice = mcts
            .select_move(Context::new(&machine, &role, &state), &mut long_clock())
            .unwrap()
            .unwrap();
        assert_eq!(choice.mv, Move::new(Term::func("choose", [Term::constant("b")])));
    }
}

#[test]
fn test_factoring_is_disjoint() {
    let machine = PropnetMachine::from_description(&games::twin_counters()).unwrap();
    let factoring = find_independent_subgames(machine.propnet());
    assert_eq!(factoring.len(), 2);
    let [a, b] = factoring.subgames() else {
        panic!("expected two subgames");
    };
    assert!(!a.inputs().intersects(b.inputs()));
    for mv in a.moves(0).iter().flatten() {
        assert!(!b.contains(0, mv));
    }
}

fn engines(machine: &PropnetMachine) -> Vec<Box<dyn Strategy<PropnetMachine> + Send>> {
    vec![
        Box::new(Minimax::new(
            MinimaxConfig::default()
                .with_depth(DepthPolicy::Exhaustive)
                .with_budget_fraction(1.0),
            Heuristic::Zero,
        )),
        Box::new(Minimax::new(
            MinimaxConfig::default().with_budget_fraction(1.0),
            Heuristic::MonteCarlo { samples: 4 },
        )),
        Box::new(Mcts::new(MctsConfig::default())),
        Box::new(ThreadedMcts::new(MctsConfig::default().with_workers(2))),
        Box::new(FactoredMcts::new(
            find_independent_subgames(machine.propnet()),
            MctsConfig::default(),
        )),
    ]
}

#[test]
fn test_deadline_is_respected() {
    let games = [
        ("counting", games::counting(250)),
        ("nim", games::nim(15, 3)),
        ("twin counters", games::twin_counters()),
        ("tic-tac-toe", games::tic_tac_toe()),
    ];
    let budget = Duration::from_millis(10);
    for (game, description) in games {
        let machine = PropnetMachine::from_description(&description).unwrap();
        for strategy in engines(&machine) {
            let role = machine.roles()[0].clone();
            let mut player = Player::new(machine.clone(), role, strategy)
                .with_config(PlayerConfig::default().with_safety_margin(Duration::ZERO));
            let start = Instant::now();
            let mv = player.select_move(Deadline::after(budget)).unwrap();
            let elapsed = start.elapsed();
            assert!(
                elapsed < budget + Duration::from_millis(25),
                "{} on {} took {:?}",
                player.strategy_name(),
                game,
                elapsed
            );
            assert!(machine.legal_moves(player.state(), player.role()).contains(&mv));
        }
    }
}

#[test]
fn test_full_match() {
    let machine = PropnetMachine::from_description(&games::tic_tac_toe()).unwrap();
    let config = PlayerConfig::default().with_safety_margin(Duration::from_millis(5));
    let mut players = vec![
        Player::new(machine.clone(), machine.roles()[0].clone(), Box::new(Minimax::default())).with_config(config.clone()),
        Player::new(
            machine.clone(),
            machine.roles()[1].clone(),
            Box::new(Mcts::new(MctsConfig::default().with_seed(3))),
        )
        .with_config(config),
    ];
    let start = machine.initial_state();
    for player in &mut players {
        player.meta_game(Deadline::after(Duration::from_millis(20))).unwrap();
    }
    let mut state = start;
    let mut turns = 0;
    while !machine.is_terminal(&state) {
        let mut joint = Vec::new();
        for player in &mut players {
            joint.push(player.select_move(Deadline::after(Duration::from_millis(30))).unwrap());
        }
        state = machine.perform(&state, &joint).unwrap();
        for player in &mut players {
            player.play(&joint).unwrap();
            assert_eq!(player.state(), &state);
        }
        turns += 1;
        assert!(turns <= 9);
    }
    let goals = machine.goals(&state).unwrap();
    assert!(goals.iter().all(|&g| g <= 100));
}

#[test]
fn test_belief_tree_prunes_hidden_coin() {
    let machine = PropnetMachine::from_description(&games::hidden_coin()).unwrap();
    let setter = machine.role_by_name(&Term::constant("setter")).unwrap();
    let guesser = machine.role_by_name(&Term::constant("guesser")).unwrap();

    let mut joint = vec![Move::new(Term::constant("wait")); 2];
    joint[setter.index()] = Move::new(Term::func("choose", [Term::constant("tails")]));
    let state = machine.perform(&machine.initial_state(), &joint).unwrap();

    let mut informed = BeliefTree::new(machine.clone(), setter.clone()).unwrap();
    informed.append_sees(machine.percepts(&state, &setter));
    assert!(informed.extend_to_depth(1).unwrap());
    let possible = informed.possible_nodes_at_depth(1);
    assert_eq!(possible.len(), 1);
    assert_eq!(informed.node(possible[0].0).state(), &state);

    let mut blind = BeliefTree::new(machine.clone(), guesser.clone()).unwrap();
    blind.append_sees(machine.percepts(&state, &guesser));
    assert!(blind.extend_to_depth(1).unwrap());
    let possible = blind.possible_nodes_at_depth(1);
    assert_eq!(possible.len(), 2);
    let total: f64 = possible.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-9);
}
