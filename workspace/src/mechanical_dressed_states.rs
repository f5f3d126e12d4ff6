#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use ndarray as nd;
use nv_lab::{
    write_npz,
    println_flush,
    dressed::protected_mask,
};
use lib::{ config_from_args, output_dir };

fn main() -> anyhow::Result<()> {
    let config = config_from_args()?;
    let dressed = config.dressed()?;
    let outdir = output_dir(&config, "mechanical_dressed_states")?;

    let params = dressed.params;
    println_flush!("working detuning = {:.4} MHz", params.working_detuning());
    let field: nd::Array1<f64> = dressed.field_points();
    println_flush!("computing {} field points ...", field.len());
    let branches = params.sweep_field(dressed.rabi, &field)?;
    let (slope_up, slope_down) = branches.plus_slopes()?;
    let protected_up = protected_mask(&slope_up, dressed.threshold);
    let protected_down = protected_mask(&slope_down, dressed.threshold);
    println!(
        "protected points: {} (up+), {} (down+)",
        protected_up.iter().filter(|p| **p).count(),
        protected_down.iter().filter(|p| **p).count(),
    );

    write_npz!(
        outdir.join("mechanical_dressed_states.npz"),
        arrays: {
            "field" => &branches.field,
            "up_plus" => &branches.up_plus,
            "up_minus" => &branches.up_minus,
            "down_plus" => &branches.down_plus,
            "down_minus" => &branches.down_minus,
            "slope_up_plus" => &slope_up,
            "slope_down_plus" => &slope_down,
            "protected_up_plus" => &protected_up,
            "protected_down_plus" => &protected_down,
            "rabi" => &nd::array![dressed.rabi],
            "threshold" => &nd::array![dressed.threshold],
        }
    );

    println!("done");
    Ok(())
}
