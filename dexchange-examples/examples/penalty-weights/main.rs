use dexchange::{
    DesignMatrix, ExchangeCriteria, FedorovExchange, InteractionMode, PenalizedDOptimality,
    Result,
};
use env_logger::{Builder, Env};
use log::info;
use nalgebra::DMatrix;
use rand::{SeedableRng, rngs::StdRng};

const LEVELS: [usize; 3] = [4, 2, 3];

fn full_factorial(levels: &[usize]) -> DMatrix<usize> {
    let nrows: usize = levels.iter().product();
    DMatrix::from_fn(nrows, levels.len(), |r, c| {
        let repeat: usize = levels[c + 1..].iter().product();
        (r / repeat) % levels[c]
    })
}

fn survey(n: usize) -> Result<DesignMatrix> {
    let mut dm = DesignMatrix::new(n);
    dm.add_attribute("price", LEVELS[0], vec![0.1, 0.2, 0.3, 0.4])?;
    dm.add_attribute("brand", LEVELS[1], vec![0.5, 0.5])?;
    dm.add_attribute("size", LEVELS[2], vec![0.2, 0.5, 0.3])?;
    dm.add_interaction("price", "size", 0, 2, InteractionMode::MustDiffer)?;
    dm.add_interaction("brand", "size", 1, 1, InteractionMode::MustMatch)?;
    Ok(dm)
}

// compares the unpenalized D-optimal design with increasingly penalized ones
fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("warn")).init();

    let candidates = full_factorial(&LEVELS);
    let criteria = ExchangeCriteria {
        max_iter: 200,
        ..ExchangeCriteria::default()
    };

    println!(
        "{:>8} {:>12} {:>10} {:>12} {:>8}",
        "weight", "criterion", "slack", "interaction", "swaps"
    );
    for weight in [0., 0.01, 0.1, 1., 10.] {
        let mut dm = survey(24)?;
        dm.generate_with_rng(&mut StdRng::seed_from_u64(7));
        let outcome = FedorovExchange::new(weight)
            .with_criteria(criteria.clone())
            .run(&mut dm, &candidates)?;
        let slacks = dm.update_slacks();
        let distribution: f64 = slacks.distribution.iter().map(|s| s.abs().sum()).sum();
        let interaction = slacks.interaction;
        println!(
            "{:>8} {:>12.4} {:>10.4} {:>12} {:>8}",
            weight,
            PenalizedDOptimality::criterion(dm.x()),
            distribution,
            interaction,
            outcome.swaps.len()
        );
        info!("weight {weight}: {}", outcome.termination);
    }
    Ok(())
}
