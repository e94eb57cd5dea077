//! Gauge commands: list, add, remove, increment.

use daygauge_core::{Gauge, IncrementOutcome};
use serde::Serialize;

use super::open_service;

#[derive(Serialize)]
struct GaugeList {
    gauges: Vec<Gauge>,
}

pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    let svc = open_service()?;
    let gauges = svc.list()?;
    println!("{}", serde_json::to_string_pretty(&GaugeList { gauges })?);
    Ok(())
}

pub fn add(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let svc = open_service()?;
    let gauge = svc.add(name)?;
    println!("Gauge added: {}", gauge.name);
    Ok(())
}

pub fn remove(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let svc = open_service()?;
    svc.remove(name)?;
    println!("Gauge removed: {name}");
    Ok(())
}

pub fn increment(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let svc = open_service()?;
    let result = svc.increment(name, svc.now())?;
    if result.outcome == IncrementOutcome::AlreadyIncrementedToday {
        eprintln!("{name} was already incremented today");
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
