#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use ndarray as nd;
use nv_lab::{
    write_npz,
    println_flush,
    beam::{ self, BeamFrame, BeamParams },
};
use lib::{ config_from_args, output_dir };

fn main() -> anyhow::Result<()> {
    let config = config_from_args()?;
    let beam_config = config.beam()?;
    let outdir = output_dir(&config, "beam_waist")?;

    for path in beam_config.files.iter() {
        println_flush!("{}:", path.display());
        let frame = match BeamFrame::load(path, beam_config.pixel) {
            Ok(frame) => frame,
            Err(err) => {
                eprintln!("  failed to load frame: {}", err);
                continue;
            },
        };
        let guess = BeamParams {
            amplitude: beam_config.amplitude,
            background: beam_config.background,
            waist: beam_config.waist,
            ..frame.initial_guess()
        };
        let fit = match beam::fit(&frame, &guess, beam_config.maxfev) {
            Ok(fit) => fit,
            Err(err) => {
                eprintln!("  fit failed: {}", err);
                continue;
            },
        };
        let BeamParams { amplitude, background, x0, y0, waist } = fit.params;
        println!("  A = {:.3} ± {:.3}", amplitude, fit.errors.amplitude);
        println!("  B = {:.3} ± {:.3}", background, fit.errors.background);
        println!("  (x0, y0) = ({:.2}, {:.2}) μm", x0, y0);
        println!("  {}", beam::format_waist(waist, fit.errors.waist));

        let surface: nd::Array2<f64>
            = beam::render(&fit.params, frame.shape(), frame.pixel());
        let stem = path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        write_npz!(
            outdir.join(format!("{}_fit.npz", stem)),
            arrays: {
                "data" => frame.data(),
                "fit" => &surface,
                "x" => &frame.x_coords(),
                "y" => &frame.y_coords(),
                "params" => &fit.params.to_array(),
                "errors" => &fit.errors.to_array(),
            }
        );
    }

    println!("done");
    Ok(())
}
