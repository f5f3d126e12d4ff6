#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use nv_lab::{
    println_flush,
    field::NvGroundState,
    optim::NelderMead,
};
use lib::config_from_args;

fn main() -> anyhow::Result<()> {
    let config = config_from_args()?;
    let field_config = config.field()?;
    let nv = NvGroundState {
        zfs: field_config.zfs,
        gamma: field_config.gamma,
        phi: field_config.phi,
    };
    let minimizer = NelderMead::default()
        .with_xtol(field_config.xtol)
        .with_ftol(field_config.ftol);

    for f in field_config.frequencies.iter().copied() {
        println_flush!("f = ({}, {}) MHz", f[0], f[1]);
        match nv.estimate_with(f, &minimizer) {
            Ok(est) => {
                println!("  B0 = {:.4} G", est.b0);
                println!("  theta = {:.4} deg", est.theta);
                println!("  cost = {:.3e}", est.cost);
                if !est.converged {
                    println!("  warning: minimizer did not converge");
                }
            },
            Err(err) => { eprintln!("  estimate failed: {}", err); },
        }
    }

    println!("done");
    Ok(())
}
