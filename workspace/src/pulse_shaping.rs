#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use nv_lab::{
    write_npz,
    println_flush,
    pulse::{ PulseShape, time_grid },
    rabi::{ bloch_trajectory, detuning_sweep },
    spin::proj_up,
};
use lib::{ config_from_args, output_dir };

fn main() -> anyhow::Result<()> {
    let config = config_from_args()?;
    let pulse = config.pulse()?;
    let outdir = output_dir(&config, "pulse_shaping")?;

    let time: nd::Array1<f64> = time_grid(pulse.tmax(), pulse.dt);
    let shape = PulseShape::new_sech(pulse.omega0(), pulse.lambda(), pulse.sweep_rate);
    let (amplitude, detuning) = shape.gen_time_dep(&time);
    let rho0: nd::Array2<C64> = proj_up();
    println_flush!("{} time steps of {} ns", time.len(), pulse.dt);

    let bloch: nd::Array2<f64>
        = bloch_trajectory(&rho0, &amplitude, &detuning, pulse.dt)?;
    if let Some(last) = bloch.columns().into_iter().last() {
        println!(
            "final Bloch vector: ({})",
            last.iter().map(|x| format!("{:+.6}", x)).join(", "),
        );
    }

    let offsets: nd::Array1<f64> = pulse.offset_points();
    println_flush!("sweeping {} detuning offsets ...", offsets.len());
    let sweep = detuning_sweep(&rho0, &amplitude, &detuning, pulse.dt, &offsets)?;

    write_npz!(
        outdir.join("pulse_shaping.npz"),
        arrays: {
            "time" => &time,
            "amplitude" => &amplitude,
            "detuning" => &detuning,
            "bloch" => &bloch,
            "offsets" => &sweep.offsets,
            "population" => &sweep.population,
            "dispersion" => &sweep.dispersion,
        }
    );

    println!("done");
    Ok(())
}
