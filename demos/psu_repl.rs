use anyhow::{Context, Result};
use std::io::Write;
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};

use rfpsu_proto::{ControlMode, Psu, Revision, SerialConfig, SerialConnector};

fn cmd_status(psu: &mut Psu<SerialConnector>) -> Result<()> {
    let status = psu.status()?;
    println!("{:#?}", status);
    Ok(())
}

fn cmd_setpoint(args: &mut CmdScanner, psu: &mut Psu<SerialConnector>) -> Result<()> {
    match args.parse_next::<u16>() {
        Ok(value) => psu.write_setpoint(value)?,
        Err(_) => println!("setpoint: {} permille", psu.read_setpoint()?),
    }
    Ok(())
}

fn cmd_mode(args: &mut CmdScanner, psu: &mut Psu<SerialConnector>) -> Result<()> {
    match args.parse_next::<u16>() {
        Ok(value) => psu.set_control_mode(ControlMode::new(value)?)?,
        Err(_) => println!("mode: {:?}", psu.control_mode()?),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let config = SerialConfig::new(&port);
    let mut psu = Psu::with_config(config, Revision::V1);

    println!("Connecting to RF supply on {}...", port);
    psu.run_session(|psu| {
        let mut stdout = std::io::stdout();
        loop {
            print!(">> ");
            stdout.flush().ok();
            let mut line = String::new();
            let mut scan = CmdScanner::read_stdin(&mut line);
            if let Err(err) = match scan.next() {
                Err(_) => break,
                Ok("status") | Ok("s") => cmd_status(psu),
                Ok("sp") => cmd_setpoint(&mut scan, psu),
                Ok("mode") => cmd_mode(&mut scan, psu),
                Ok("on") => psu.rf_on().map_err(Into::into),
                Ok("off") => psu.rf_off().map_err(Into::into),
                Ok("reset") => psu.reset_error().map_err(Into::into),
                Ok("quit") | Ok("q") => break,
                Ok(cmd) => {
                    println!("Unknown command {}", cmd);
                    continue;
                }
            } {
                println!("{:?}", err)
            }
        }
        Ok(())
    })?;
    println!("Session closed, RF is off.");
    Ok(())
}

struct CmdScanner<'a> {
    splt: Peekable<SplitWhitespace<'a>>,
}

impl<'a> CmdScanner<'a> {
    fn read_stdin(buf: &'a mut String) -> Self {
        buf.clear();
        std::io::stdin().read_line(buf).unwrap();
        let splt = buf.split_whitespace().peekable();
        Self { splt }
    }
    fn next(&mut self) -> Result<&str> {
        self.splt.next().context("End of stream")
    }
    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
}
