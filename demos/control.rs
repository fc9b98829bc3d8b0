use kef_wireless::{BlockingKefSpeaker, Power, Source, SpeakerOptions};
use std::env;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: control <host> <command> [value]

commands:
  status              print power, source and volume
  on [source]         turn on, optionally switching source
  off                 put the speaker in standby
  source <name>       select Wifi, Bluetooth, Aux, Opt or Usb
  volume <0..1>       set the volume
  up | down           step the volume
  mute | unmute

Set KEF_OPTIONS to a JSON file to override the default options.";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (host, command) = match (args.first(), args.get(1)) {
        (Some(host), Some(command)) => (host.as_str(), command.as_str()),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };
    let value = args.get(2).map(String::as_str);

    let options = match env::var("KEF_OPTIONS") {
        Ok(path) => SpeakerOptions::from_json(&std::fs::read_to_string(path)?)?,
        Err(_) => SpeakerOptions::default(),
    };
    let speaker = BlockingKefSpeaker::new(host, options)?;

    if !speaker.is_online() {
        println!("Speaker at {} is offline", speaker.endpoint());
        return Ok(());
    }

    match (command, value) {
        ("status", _) => print_status(&speaker)?,
        ("on", source) => {
            let source = source.map(str::parse::<Source>).transpose()?;
            speaker.turn_on(source)?;
            print_status(&speaker)?;
        }
        ("off", _) => speaker.turn_off()?,
        ("source", Some(name)) => {
            speaker.set_source(name.parse()?, Power::On)?;
            print_status(&speaker)?;
        }
        ("volume", Some(level)) => {
            let applied = speaker.set_volume(level.parse()?)?;
            println!("Volume: {:.2}", applied);
        }
        ("up", _) => println!("Volume: {:.2}", speaker.increase_volume()?),
        ("down", _) => println!("Volume: {:.2}", speaker.decrease_volume()?),
        ("mute", _) => speaker.mute()?,
        ("unmute", _) => speaker.unmute()?,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    speaker.shutdown();
    Ok(())
}

fn print_status(speaker: &BlockingKefSpeaker) -> Result<(), Box<dyn std::error::Error>> {
    let state = speaker.get_source_and_power()?;
    let (volume, muted) = speaker.get_volume_and_mute(true)?;

    println!("Speaker: {}", speaker.endpoint());
    println!("Power:   {}", if state.is_on { "on" } else { "standby" });
    println!("Source:  {}", state.source);
    if muted {
        println!("Volume:  muted");
    } else {
        println!("Volume:  {:.2}", volume);
    }
    Ok(())
}
