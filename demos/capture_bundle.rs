// Capture every interesting channel into a bundle and archive it as JSON.
//
// Point this at a DS4000E on the LAN; the raw-SCPI socket listens on 5555.

use ds4000_rs::{Ds4000, TcpTransport, WaveformBundle};
use std::collections::BTreeMap;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (optional)
    env_logger::init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "192.168.0.220".to_string());

    println!("DS4000 Bundle Capture Example");
    println!("=============================\n");

    println!("1. Connecting to {}...", host);
    let transport = TcpTransport::connect(
        (host.as_str(), TcpTransport::DEFAULT_PORT),
        Duration::from_secs(5),
    )?;
    let mut scope = Ds4000::new(transport);
    println!("Connected: {}", scope.identity()?);

    // Trigger the scope however your setup needs, then collect. The trigger
    // settings recorded here are the ones in effect at retrieval time.
    let mut channel_names = BTreeMap::new();
    channel_names.insert("CHAN1".to_string(), "input left".to_string());
    channel_names.insert("CHAN3".to_string(), "output left".to_string());

    println!("\n2. Collecting {} channels...", channel_names.len());
    let bundle = WaveformBundle::collect("Fader at midpoint", &channel_names, &mut scope)?;

    for (channel, waveform) in &bundle.waveforms {
        println!(
            "  {}: {} samples at {} Sa/s",
            channel,
            waveform.samples.len(),
            waveform.sample_rate
        );
    }

    println!("\n3. Writing midpoint.json...");
    let mut file = std::fs::File::create("midpoint.json")?;
    bundle.to_json_writer(&mut file)?;
    println!("Done.");

    Ok(())
}
