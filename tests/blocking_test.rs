mod common;

use assert_matches::assert_matches;
use common::{fast_options, FakeSpeaker, OFF, USB, WIFI};
use kef_wireless::{BlockingKefSpeaker, KefError, KefSpeaker, Power, Source};

fn blocking(fake: &FakeSpeaker) -> BlockingKefSpeaker {
    BlockingKefSpeaker::with_connector("speaker.local", fast_options(), fake.connector())
        .expect("Failed to create blocking speaker")
}

#[test]
fn test_blocking_volume() {
    let fake = FakeSpeaker::new(25, USB);
    let speaker = blocking(&fake);

    assert_eq!(speaker.get_volume().unwrap(), Some(0.25));
    assert_eq!(speaker.set_volume(0.4).unwrap(), 0.4);
    assert_eq!(fake.volume(), 40);

    speaker.mute().unwrap();
    assert!(speaker.is_muted().unwrap());
    assert_eq!(speaker.get_volume_and_mute(false).unwrap(), (168.0, true));

    speaker.increase_volume().unwrap();
    assert!(!speaker.is_muted().unwrap());
    assert_eq!(fake.volume(), 45);
}

#[test]
fn test_blocking_power_and_source() {
    let fake = FakeSpeaker::new(25, USB + OFF);
    let speaker = blocking(&fake);

    assert!(!speaker.is_on().unwrap());
    speaker.turn_on(Some(Source::Wifi)).unwrap();
    assert_eq!(fake.source(), WIFI);
    assert_eq!(speaker.get_source().unwrap(), Source::Wifi);

    speaker.set_source(Source::Usb, Power::On).unwrap();
    assert_eq!(fake.source(), USB);

    speaker.turn_off().unwrap();
    assert!(!speaker.get_source_and_power().unwrap().is_on);
}

#[test]
fn test_blocking_offline() {
    let fake = FakeSpeaker::new(25, USB);
    fake.set_unreachable(true);
    let speaker = blocking(&fake);

    assert!(!speaker.is_online());
    let err = speaker.get_volume().unwrap_err();
    assert!(err.is_offline());
}

#[test]
fn test_blocking_errors_propagate() {
    let fake = FakeSpeaker::new(25, 99);
    let speaker = blocking(&fake);

    assert_matches!(speaker.get_source(), Err(KefError::UnknownSource(99)));
    assert_matches!(speaker.set_volume(f64::NAN), Err(KefError::InvalidInput(_)));
}

#[test]
fn test_blocking_reuses_connection() {
    let fake = FakeSpeaker::new(25, USB);
    let speaker = blocking(&fake);

    assert!(speaker.is_online());
    speaker.get_volume().unwrap();
    speaker.get_source().unwrap();
    assert_eq!(fake.connects(), 1);

    speaker.shutdown();
}

#[test]
fn test_from_speaker_on_existing_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let fake = FakeSpeaker::new(25, USB);
    let speaker = {
        let _guard = runtime.enter();
        KefSpeaker::with_connector("speaker.local", fast_options(), fake.connector()).unwrap()
    };

    let speaker = BlockingKefSpeaker::from_speaker(speaker, runtime.handle().clone());

    assert_eq!(speaker.host(), "speaker.local");
    assert_eq!(speaker.set_volume(0.1).unwrap(), 0.1);
    assert_eq!(fake.volume(), 10);
}
