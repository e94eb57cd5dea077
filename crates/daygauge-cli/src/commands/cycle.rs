use super::open_service;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let svc = open_service()?;
    let report = svc.run_cycle(svc.now(), force)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failed > 0 {
        return Err(format!("decay failed for {} gauge(s)", report.failed).into());
    }
    Ok(())
}
