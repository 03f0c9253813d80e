//! staconfig – inspect and set spatio-temporal addresses by hand.
//!
//! ```text
//! staconfig                               show the address on the default interface
//! staconfig IFNAME                        show the address on IFNAME
//! staconfig IFNAME del                    remove the address from IFNAME
//! staconfig IFNAME add LAT LON ALT [TIME] encode a fix and bind it on IFNAME
//! ```

use std::env;
use std::process;

use chrono::Utc;
use netif::Interface;
use sta::Position;

const DEFAULT_WLAN_INTERFACE: &str = "ath0";

fn usage() -> ! {
    eprintln!("Usage: staconfig [interface [del | add latitude longitude altitude [time]]]");
    process::exit(1);
}

fn show_sta(name: &str) -> Result<(), String> {
    let interface = Interface::new(name).map_err(|err| err.to_string())?;
    match interface.station_address().map_err(|err| err.to_string())? {
        Some(address) => {
            println!("{name} STA: {address}");
            Ok(())
        }
        None => Err("STA not found.".to_string()),
    }
}

fn delete_sta(name: &str) -> Result<(), String> {
    let interface = Interface::new(name).map_err(|err| err.to_string())?;
    let address = interface
        .station_address()
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "STA not found.".to_string())?;
    interface
        .remove_address(address)
        .map_err(|err| err.to_string())
}

fn add_sta(name: &str, position: &Position) -> Result<(), String> {
    let interface = Interface::new(name).map_err(|err| err.to_string())?;
    let address = sta::encode(position).map_err(|err| err.to_string())?;
    interface
        .add_address(address)
        .map_err(|err| err.to_string())?;
    println!("# add_sta complete, new address = {address}");
    Ok(())
}

fn parse_position(args: &[String]) -> Option<Position> {
    let (fix, time) = match args {
        [lat, lon, alt] => ([lat, lon, alt], Utc::now().timestamp()),
        [lat, lon, alt, time] => ([lat, lon, alt], time.parse().ok()?),
        _ => return None,
    };
    let [lat, lon, alt] = fix.map(|field| field.parse::<f64>().ok());
    Some(Position {
        time,
        lat: lat?,
        lon: lon?,
        alt: alt?,
    })
}

fn main() {
    logger::init("staconfig", true);
    let args: Vec<String> = env::args().skip(1).collect();

    let result = match args.as_slice() {
        [] => show_sta(DEFAULT_WLAN_INTERFACE),
        [interface] => show_sta(interface),
        [interface, command, rest @ ..] => match command.as_str() {
            "del" if rest.is_empty() => delete_sta(interface),
            "add" => match parse_position(rest) {
                Some(position) => add_sta(interface, &position),
                None => usage(),
            },
            _ => {
                eprintln!("Invalid argument.\nChoose add or del.");
                usage();
            }
        },
    };

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(fields: &[&str]) -> Vec<String> {
        fields.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn fixes_are_parsed_with_and_without_a_timestamp() {
        let position = parse_position(&args(&["35.68", "139.77", "12.5", "1153000000"])).unwrap();
        assert_eq!(position.lat, 35.68);
        assert_eq!(position.lon, 139.77);
        assert_eq!(position.alt, 12.5);
        assert_eq!(position.time, 1_153_000_000);

        let now = Utc::now().timestamp();
        let position = parse_position(&args(&["-10.0", "20.0", "0"])).unwrap();
        assert_eq!(position.lat, -10.0);
        assert!(position.time >= now);
    }

    #[test]
    fn malformed_fixes_are_rejected() {
        assert!(parse_position(&args(&[])).is_none());
        assert!(parse_position(&args(&["35.68", "139.77"])).is_none());
        assert!(parse_position(&args(&["north", "139.77", "0"])).is_none());
        assert!(parse_position(&args(&["35.68", "139.77", "0", "noon"])).is_none());
        assert!(parse_position(&args(&["1", "2", "3", "4", "5"])).is_none());
    }
}
