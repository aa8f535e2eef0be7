use dexchange::{
    DesignMatrix, Error, ExchangeCriteria, FedorovExchange, InteractionMode,
    PenalizedDOptimality, Result, Termination, information_determinant, run_fedorov_exchange,
};
use nalgebra::DMatrix;
use rand::{SeedableRng, rngs::StdRng};

const EQ_MAX_REL: f64 = 1e-6;

fn full_factorial(levels: &[usize]) -> DMatrix<usize> {
    let nrows: usize = levels.iter().product();
    DMatrix::from_fn(nrows, levels.len(), |r, c| {
        let repeat: usize = levels[c + 1..].iter().product();
        (r / repeat) % levels[c]
    })
}

fn health_design(seed: u64) -> Result<DesignMatrix> {
    let mut dm = DesignMatrix::new(8);
    dm.add_attribute("age", 3, vec![0.25, 0.50, 0.25])?;
    dm.add_attribute("sex", 2, vec![0.5, 0.5])?;
    dm.add_attribute("bmi", 3, vec![0.33, 0.33, 0.34])?;
    dm.generate_with_rng(&mut StdRng::seed_from_u64(seed));
    Ok(dm)
}

fn binary_design() -> Result<DesignMatrix> {
    let mut dm = DesignMatrix::new(4);
    dm.add_attribute("a", 2, vec![50., 50.])?;
    dm.add_attribute("b", 2, vec![50., 50.])?;
    // X^T X = [[3, 0], [0, 1]]
    dm.set_x(DMatrix::from_row_slice(4, 2, &[1, 0, 1, 0, 1, 0, 0, 1]))?;
    Ok(dm)
}

fn assert_rel_eq(a: f64, b: f64) {
    assert!(
        (a - b).abs() <= EQ_MAX_REL * a.abs().max(b.abs()).max(1.),
        "{a} != {b}"
    );
}

#[test]
fn test_full_factorial() {
    let ff = full_factorial(&[2, 3]);
    let ff_rslt = DMatrix::from_row_slice(6, 2, &[0, 0, 0, 1, 0, 2, 1, 0, 1, 1, 1, 2]);
    assert_eq!(ff, ff_rslt);
}

#[test]
fn test_health_scenario() -> Result<()> {
    let mut dm = health_design(42)?;
    assert_eq!(dm.shape(), (8, 3));
    let age_zeros = dm.x().column(0).iter().filter(|&&v| v == 0).count();
    let age_ones = dm.x().column(0).iter().filter(|&&v| v == 1).count();
    assert_eq!((age_zeros, age_ones), (2, 4));

    assert!(matches!(
        dm.add_row(&[3, 3, 3]),
        Err(Error::LevelOutOfRange { .. })
    ));
    assert_eq!(dm.nrows(), 8);

    dm.add_row(&[1, 1, 1])?;
    assert_eq!(dm.nrows(), 9);

    let x = dm.x().clone();
    dm.del_row(1)?;
    assert_eq!(dm.nrows(), 8);
    assert_eq!(dm.x(), &x.remove_row(1));

    let slacks = dm.update_slacks();
    assert_eq!(slacks.distribution.len(), 3);
    Ok(())
}

#[test]
fn test_exchange_single_iteration() -> Result<()> {
    let mut dm = binary_design()?;
    let candidates = full_factorial(&[2, 2]);
    let criteria = ExchangeCriteria {
        max_iter: 1,
        ..ExchangeCriteria::default()
    };
    let outcome = FedorovExchange::new(0.)
        .with_criteria(criteria)
        .run(&mut dm, &candidates)?;

    assert_eq!(outcome.termination, Termination::IterationLimitReached);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.swaps.len(), 1);
    // first of the three equivalent rows is replaced by [1, 1]
    let swap = &outcome.swaps[0];
    assert_eq!((swap.row, swap.candidate), (0, 3));
    assert_rel_eq(swap.delta, 2. / 3.);
    assert_rel_eq(outcome.determinant, 5.);
    assert_eq!(dm.row(3), Some(vec![1, 1]));
    Ok(())
}

#[test]
fn test_exchange_converges_to_optimum() -> Result<()> {
    let mut dm = binary_design()?;
    let candidates = full_factorial(&[2, 2]);
    let outcome = run_fedorov_exchange(&mut dm, &candidates, 0.)?;

    assert_eq!(outcome.termination, Termination::Converged);
    assert!(outcome.iterations >= 2);
    // det(X^T X) of four binary rows is at most 5
    assert_rel_eq(outcome.determinant, 5.);
    assert_rel_eq(dm.information_determinant(), 5.);
    assert_eq!(&outcome.design, dm.x());
    assert_rel_eq(outcome.score, PenalizedDOptimality::criterion(dm.x()));
    Ok(())
}

#[test]
fn test_exchange_tracked_determinant() -> Result<()> {
    for seed in 0..5 {
        let mut dm = health_design(seed)?;
        dm.add_interaction("age", "bmi", 0, 2, InteractionMode::MustDiffer)?;
        let initial = dm.clone();
        let candidates = full_factorial(&[3, 2, 3]);
        let outcome = run_fedorov_exchange(&mut dm, &candidates, 0.5)?;

        let mut replay = initial;
        for swap in &outcome.swaps {
            replay.del_row(swap.row)?;
            let row: Vec<usize> = candidates.row(swap.candidate).iter().copied().collect();
            replay.add_row(&row)?;
            assert_rel_eq(swap.determinant, replay.information_determinant());
        }
        assert_eq!(replay.x(), dm.x());
        assert_rel_eq(outcome.determinant, information_determinant(dm.x()));
    }
    Ok(())
}

#[test]
fn test_exchange_objective_increases() -> Result<()> {
    let weight = 2.;
    let mut dm = health_design(9)?;
    dm.add_interaction("sex", "bmi", 0, 0, InteractionMode::MustDiffer)?;
    dm.add_interaction("age", "sex", 2, 1, "must_match")?;
    let mut replay = dm.clone();
    let candidates = full_factorial(&[3, 2, 3]);
    let outcome = run_fedorov_exchange(&mut dm, &candidates, weight)?;

    let objective = |d: &mut DesignMatrix| {
        d.information_determinant() - weight * d.update_slacks().total()
    };
    let mut last = objective(&mut replay);
    for swap in &outcome.swaps {
        assert!(swap.improvement > 0.);
        replay.del_row(swap.row)?;
        let row: Vec<usize> = candidates.row(swap.candidate).iter().copied().collect();
        replay.add_row(&row)?;
        let current = objective(&mut replay);
        assert!(current > last - EQ_MAX_REL * last.abs().max(1.));
        last = current;
    }
    Ok(())
}

#[test]
fn test_exchange_penalty_dominates() -> Result<()> {
    let mut dm = health_design(3)?;
    dm.add_interaction("age", "bmi", 0, 2, InteractionMode::MustDiffer)?;
    dm.add_interaction("age", "bmi", 2, 0, InteractionMode::MustDiffer)?;
    let initial_penalty = dm.update_slacks().total();
    let candidates = full_factorial(&[3, 2, 3]);
    run_fedorov_exchange(&mut dm, &candidates, 1e9)?;
    let final_penalty = dm.update_slacks().total();
    assert!(final_penalty <= initial_penalty + 1e-9);
    Ok(())
}

#[test]
fn test_exchange_parallel_matches_sequential() -> Result<()> {
    let candidates = full_factorial(&[3, 2, 3]);
    let mut outcomes = vec![];
    for parallel_threshold in [0, usize::MAX] {
        let mut dm = health_design(17)?;
        dm.add_interaction("age", "bmi", 1, 1, InteractionMode::MustMatch)?;
        let criteria = ExchangeCriteria {
            parallel_threshold,
            ..ExchangeCriteria::default()
        };
        let outcome = FedorovExchange::new(0.3)
            .with_criteria(criteria)
            .run(&mut dm, &candidates)?;
        outcomes.push(outcome);
    }
    assert_eq!(outcomes[0].design, outcomes[1].design);
    assert_eq!(outcomes[0].swaps.len(), outcomes[1].swaps.len());
    assert_eq!(outcomes[0].termination, outcomes[1].termination);
    Ok(())
}

#[test]
fn test_exchange_design_rows_as_candidates() -> Result<()> {
    let mut dm = health_design(5)?;
    let candidates = dm.x().clone();
    let outcome = run_fedorov_exchange(&mut dm, &candidates, 0.)?;
    assert!(outcome.iterations <= 100);
    assert_eq!(dm.nrows(), 8);
    Ok(())
}

#[test]
fn test_exchange_iteration_cap() -> Result<()> {
    let mut dm = DesignMatrix::new(6);
    for name in ["a", "b", "c"] {
        dm.add_attribute(name, 2, vec![0.5, 0.5])?;
    }
    // X^T X = diag(4, 1, 1), the best single swap reaches det 10 and another swap of a (1, 0, 0)
    // row for (0, 1, 1) still improves on that; integer determinants keep every gain above 10%
    dm.set_x(DMatrix::from_row_slice(
        6,
        3,
        &[1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1],
    ))?;
    let candidates = full_factorial(&[2, 2, 2]);
    let criteria = ExchangeCriteria {
        max_iter: 2,
        ..ExchangeCriteria::default()
    };
    let outcome = FedorovExchange::new(0.)
        .with_criteria(criteria)
        .run(&mut dm, &candidates)?;

    assert_eq!(outcome.termination, Termination::IterationLimitReached);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.swaps.len(), 2);
    assert_rel_eq(outcome.swaps[0].determinant, 10.);
    assert!(outcome.determinant >= 11. - EQ_MAX_REL);
    assert_rel_eq(outcome.determinant, dm.information_determinant());
    Ok(())
}

#[test]
fn test_exchange_singular_start() -> Result<()> {
    let mut dm = DesignMatrix::new(4);
    dm.add_attribute("a", 2, vec![0.5, 0.5])?;
    dm.add_attribute("b", 2, vec![0.5, 0.5])?;
    dm.set_x(DMatrix::from_row_slice(4, 2, &[1, 0, 1, 0, 1, 0, 1, 0]))?;
    assert_eq!(dm.information_determinant(), 0.);

    let candidates = full_factorial(&[2, 2]);
    let outcome = run_fedorov_exchange(&mut dm, &candidates, 0.)?;

    // (0, 1) and (1, 1) both lead to det 3, the first candidate wins
    let swap = &outcome.swaps[0];
    assert_eq!((swap.iteration, swap.row, swap.candidate), (1, 0, 1));
    assert_rel_eq(swap.determinant, 3.);
    assert_eq!(outcome.termination, Termination::Converged);
    assert_rel_eq(outcome.determinant, 5.);
    assert_rel_eq(dm.information_determinant(), 5.);
    Ok(())
}

#[test]
fn test_exchange_candidate_validation() -> Result<()> {
    let mut dm = health_design(1)?;
    let empty = DMatrix::<usize>::zeros(0, 3);
    assert_eq!(
        run_fedorov_exchange(&mut dm, &empty, 0.),
        Err(Error::EmptyCandidateSet)
    );

    let short = full_factorial(&[3, 2]);
    assert_eq!(
        run_fedorov_exchange(&mut dm, &short, 0.),
        Err(Error::RowLength {
            row: "candidate",
            expected: 3,
            found: 2,
        })
    );

    let out_of_range = full_factorial(&[3, 3, 3]);
    assert!(matches!(
        run_fedorov_exchange(&mut dm, &out_of_range, 0.),
        Err(Error::LevelOutOfRange { column: 1, value: 2, .. })
    ));
    Ok(())
}

#[test]
fn test_exchange_outcome_display() -> Result<()> {
    let mut dm = binary_design()?;
    let candidates = full_factorial(&[2, 2]);
    let outcome = run_fedorov_exchange(&mut dm, &candidates, 0.)?;
    let display = format!("{outcome}");
    assert!(display.starts_with("-------- Statistics --------\nTermination: converged\n"));
    assert!(display.ends_with("\n----------------------------"));
    Ok(())
}
