use anyhow::{Context, Result};
use cell_fluid_sim::{build_simulator, CheckpointConfig, NumType};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

fn read_field_lines(path: &str) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    let lines = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("reading {path}"))?;
    Ok(lines)
}

fn main() -> Result<()> {
    env_logger::init();

    let mut filename = String::from("data/default.txt");
    let mut p_type = String::from("FIXED(32,16)");
    let mut v_type = String::from("FIXED(32,16)");
    let mut vf_type = String::from("FIXED(32,16)");
    let mut steps = 10000usize;
    let mut checkpoint_interval = 0usize;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        let has_value = i + 1 < args.len();
        match args[i].as_str() {
            "--p-type" if has_value => {
                i += 1;
                p_type = args[i].clone();
            }
            "--v-type" if has_value => {
                i += 1;
                v_type = args[i].clone();
            }
            "--v-flow-type" if has_value => {
                i += 1;
                vf_type = args[i].clone();
            }
            "--file" if has_value => {
                i += 1;
                filename = args[i].clone();
            }
            "--steps" if has_value => {
                i += 1;
                steps = args[i].parse().context("--steps expects a number")?;
            }
            "--checkpoint" if has_value => {
                i += 1;
                checkpoint_interval = args[i].parse().context("--checkpoint expects a number")?;
            }
            other => {
                debug!("ignoring argument {other:?}");
            }
        }
        i += 1;
    }

    let p_type = NumType::parse(&p_type)?;
    let v_type = NumType::parse(&v_type)?;
    let vf_type = NumType::parse(&vf_type)?;

    let lines = read_field_lines(&filename)?;
    let mut simulator = build_simulator(&lines, p_type, v_type, vf_type)?;

    let checkpoint = (checkpoint_interval > 0).then(|| CheckpointConfig {
        interval: checkpoint_interval,
        path: PathBuf::from(format!("{filename}.checkpoint")),
    });

    let start = Instant::now();
    simulator.run(steps, checkpoint.as_ref())?;
    println!("Simulation took {} ms", start.elapsed().as_millis());
    Ok(())
}
