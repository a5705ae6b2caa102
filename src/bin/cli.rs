//! Command-line interface for the enclosure hardware.
//!
//! One-shot maintenance commands that talk to the chips directly. Stop the
//! daemon first: each bus number must have a single logical owner.

use std::env;
use std::process;

use anyhow::Result;

use chamberd::{
    bus::LinuxSmbus,
    daemon::DaemonConfig,
    peripheral::{
        aw9523::Aw9523,
        emc2101::{Emc2101, Emc2101Config},
        pca9685::Pca9685,
    },
    tracing,
};

fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let config = DaemonConfig::from_env()?;
    let bus = config.bus_number;

    match args[1].as_str() {
        "status" => cmd_status(bus)?,
        "io" => cmd_io(bus, &args[2..])?,
        "pwm" => cmd_pwm(bus, &args[2..])?,
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            eprintln!("Run without arguments to see usage.");
            process::exit(1);
        }
    }

    Ok(())
}

fn usage() -> ! {
    eprintln!("Usage: chamber-cli <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                      Poll the fan controller once");
    eprintln!("  io reset                    Reset the I/O expander");
    eprintln!("  io input <pin>              Read an input pin");
    eprintln!("  io output <pin> <0|1>       Drive an output pin");
    eprintln!("  io led <pin> <level>        Set an LED current level (0-255)");
    eprintln!("  pwm reset [freq]            Reset the PWM chip (default 400 Hz)");
    eprintln!("  pwm state <ch> <0|1>        Switch a PWM channel fully off/on");
    eprintln!("  pwm duty <ch> <0-4096>      Set a PWM channel duty");
    eprintln!("  pwm timings <ch> <on> <off> Set raw PWM timings");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CHAMBERD_I2C_BUS    I2C bus number (default: 11)");
    process::exit(1);
}

fn parse<T: std::str::FromStr>(arg: Option<&String>, what: &str) -> T {
    match arg.and_then(|a| a.parse().ok()) {
        Some(value) => value,
        None => {
            eprintln!("Missing or invalid {}.", what);
            process::exit(1);
        }
    }
}

/// Poll the fan controller once and print its readings.
fn cmd_status(bus: u8) -> Result<()> {
    let mut fan = Emc2101::open(LinuxSmbus::open(bus)?, Emc2101Config::default())?;
    fan.poll()?;
    let sample = fan.sample();

    println!("Internal: {} degC", sample.internal_temperature);
    println!("Chamber:  {} degC", sample.external_temperature);
    println!("Target:   {} degC", fan.target_temperature());
    println!("Fan:      {} RPM", sample.fan_speed_rpm);
    println!("Status:   {:?}", sample.status);

    Ok(())
}

/// Exercise the I/O expander.
fn cmd_io(bus: u8, args: &[String]) -> Result<()> {
    let mut io = Aw9523::open(LinuxSmbus::open(bus)?)?;

    match args.first().map(String::as_str) {
        Some("reset") => {
            io.reset()?;
            println!("reset");
        }
        Some("input") => {
            let n: u8 = parse(args.get(1), "pin number");
            let pin = io.input_pin(n)?;
            println!("input {}: {}", n, io.read_input(&pin)?);
        }
        Some("output") => {
            let n: u8 = parse(args.get(1), "pin number");
            let state: u8 = parse(args.get(2), "state");
            let pin = io.output_pin(n)?;
            io.set_output(&pin, state != 0)?;
            println!("output {}: {}", n, io.output_state(&pin)?);
        }
        Some("led") => {
            let n: u8 = parse(args.get(1), "pin number");
            let level: u8 = parse(args.get(2), "level");
            let pin = io.led_pin(n)?;
            io.set_led_level(&pin, level)?;
            println!("led {}: {}", n, level);
        }
        _ => usage(),
    }

    Ok(())
}

/// Exercise the PWM driver on unit 0.
fn cmd_pwm(bus: u8, args: &[String]) -> Result<()> {
    let mut pwm = Pca9685::new(LinuxSmbus::open(bus)?, 0);

    match args.first().map(String::as_str) {
        Some("reset") => {
            let freq = args
                .get(1)
                .map(|a| parse(Some(a), "frequency"))
                .unwrap_or(400);
            pwm.reset(freq)?;
            println!("reset at {} Hz", freq);
        }
        Some("state") => {
            let n: u8 = parse(args.get(1), "channel");
            let state: u8 = parse(args.get(2), "state");
            let ch = pwm.channel(n)?;
            let old = pwm.state(&ch)?;
            pwm.set_state(&ch, state != 0)?;
            println!(
                "channel {}: state {:?} (was {:?}), timings {:?}",
                n,
                pwm.state(&ch)?,
                old,
                pwm.timings(&ch)?
            );
        }
        Some("duty") => {
            let n: u8 = parse(args.get(1), "channel");
            let duty: u16 = parse(args.get(2), "duty");
            let ch = pwm.channel(n)?;
            let old = pwm.duty_cycle(&ch)?;
            pwm.set_duty_cycle(&ch, duty)?;
            println!(
                "channel {}: duty {:?} (was {:?}), timings {:?}",
                n,
                pwm.duty_cycle(&ch)?,
                old,
                pwm.timings(&ch)?
            );
        }
        Some("timings") => {
            let n: u8 = parse(args.get(1), "channel");
            let on_time: u16 = parse(args.get(2), "on time");
            let off_time: u16 = parse(args.get(3), "off time");
            let ch = pwm.channel(n)?;
            let old = pwm.timings(&ch)?;
            pwm.set_timings(&ch, on_time, off_time)?;
            println!(
                "channel {}: timings {:?} (was {:?})",
                n,
                pwm.timings(&ch)?,
                old
            );
        }
        _ => usage(),
    }

    Ok(())
}
