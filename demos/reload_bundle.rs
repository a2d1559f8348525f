// Reload an archived bundle and inspect it offline, no instrument needed.

use ds4000_rs::WaveformBundle;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "midpoint.json".to_string());

    println!("DS4000 Bundle Reload Example");
    println!("============================\n");

    let file = std::fs::File::open(&path)?;
    let bundle = WaveformBundle::from_json_reader(file)?;

    println!("Title: {}", bundle.title);
    for (channel, waveform) in &bundle.waveforms {
        let label = bundle
            .channel_names
            .get(channel)
            .map(String::as_str)
            .unwrap_or("(unlabeled)");
        println!("\n{}: {}", channel, label);
        println!("  captured on: {}", waveform.identity);
        println!("  sample rate: {} Sa/s", waveform.sample_rate);
        println!("{}", waveform.to_dataframe()?.head(Some(5)));
    }

    Ok(())
}
