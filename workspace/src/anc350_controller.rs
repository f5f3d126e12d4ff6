#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use std::io::{ self, BufRead };
use itertools::Itertools;
use nv_lab::{
    print_flush,
    println_flush,
    positioner::{
        Axis,
        Command,
        Controller,
        KeyMap,
        Positioner,
        VirtualPositioner,
    },
};
use lib::config_from_args;

fn show_positions<P>(ctl: &Controller<P>)
where P: Positioner
{
    println_flush!(
        "{}",
        Axis::all().into_iter()
            .map(|ax| format!("{} = {} μm", ax, ctl.position_text(ax)))
            .join("  "),
    );
}

fn show_help(keys: &KeyMap) {
    println!("commands:");
    for (key, command) in keys.iter() {
        println!("  {:<8} {:?}", key, command);
    }
    println!("  x+, x-, y+, y-, z+, z-   move one step");
    println!("  read                     read all positions");
    println!("  step <axis> <μm>         set step size");
    println!("  help                     show this message");
    println!("  quit                     disable outputs and exit");
}

fn main() -> anyhow::Result<()> {
    let config = config_from_args()?;
    let ctl_config = config.controller()?;
    let device = VirtualPositioner::new(ctl_config.device_id, ctl_config.start);
    let mut ctl = Controller::new(device)?;
    for axis in Axis::all() {
        ctl.set_step_text(axis, &ctl_config.step);
    }
    let keys = KeyMap::new()?;

    println_flush!("ANC350 Controller: {}", ctl.status());
    show_positions(&ctl);
    print_flush!("> ");
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            print_flush!("> ");
            continue;
        }
        let res = match keys.parse(&line) {
            Ok(Command::Move(axis, dir)) => {
                ctl.move_axis(axis, dir).map(|_| show_positions(&ctl))
            },
            Ok(Command::Read) => ctl.read().map(|_| show_positions(&ctl)),
            Ok(Command::Focus) => Ok(()),
            Ok(Command::SetStep(axis, text)) => {
                ctl.set_step_text(axis, &text);
                ctl.step_nm(axis)
                    .map(|nm| println!("{} step = {} nm", axis, nm))
            },
            Ok(Command::Help) => {
                show_help(&keys);
                Ok(())
            },
            Ok(Command::Quit) => break,
            Err(err) => Err(err),
        };
        if let Err(err) = res { println!("error: {}", err); }
        print_flush!("> ");
    }

    ctl.shutdown()?;
    println!("done");
    Ok(())
}
