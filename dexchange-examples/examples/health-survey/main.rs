use dexchange::{DesignMatrix, InteractionMode, Result, run_fedorov_exchange};
use env_logger::{Builder, Env};
use log::info;
use nalgebra::DMatrix;
use rand::{SeedableRng, rngs::StdRng};

// full factorial of age(3) x sex(2) x bmi(3)
fn candidates() -> DMatrix<usize> {
    let mut rows = vec![];
    for age in 0..3 {
        for sex in 0..2 {
            for bmi in 0..3 {
                rows.extend([age, sex, bmi]);
            }
        }
    }
    DMatrix::from_row_slice(rows.len() / 3, 3, &rows)
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    // define design size and attributes, distributions may be given in percent
    let mut dm = DesignMatrix::new(8);
    dm.add_attribute("age", 3, vec![25., 50., 25.])?;
    dm.add_attribute("sex", 2, vec![0.5, 0.5])?;
    dm.add_attribute("bmi", 3, vec![33., 33., 34.])?;
    dm.add_interaction("age", "bmi", 0, 2, InteractionMode::MustDiffer)?;
    dm.add_interaction("sex", "bmi", 0, 0, "must_differ")?;
    for constraint in dm.constraints() {
        info!("constraint: {constraint}");
    }

    // seeded initial design
    dm.generate_with_rng(&mut StdRng::seed_from_u64(42));
    println!("{dm}");

    // rows are validated against the attribute levels
    if let Err(err) = dm.add_row(&[3, 3, 3]) {
        info!("rejected row: {err}");
    }
    dm.add_row(&[1, 1, 1])?;
    dm.del_row(1)?;

    let slacks = dm.update_slacks().clone();
    for (attribute, slack) in dm.attributes().iter().zip(&slacks.distribution) {
        info!("distribution slack of {}: {:?}", attribute.name, slack.as_slice());
    }
    info!("interaction slack: {}", slacks.interaction);

    let outcome = run_fedorov_exchange(&mut dm, &candidates(), 0.1)?;
    println!("{dm}");
    println!("{outcome}");
    Ok(())
}
