//! End-to-end tests: JSON lines in, published messages out.

use std::io::Cursor;
use tensor_smoother::config::Config;
use tensor_smoother::core::ModeTracker;
use tensor_smoother::publish::{ChannelPublisher, Dispatcher, Message};
use tensor_smoother::source::LineSource;
use tensor_smoother::stats::create_shared_stats;

fn run_pipeline(config: &Config, input: &str) -> Vec<Message> {
    let stats = create_shared_stats();
    let mut tracker: ModeTracker<i64> = ModeTracker::new(&config.tracker_config().unwrap()).unwrap();
    let (publisher, receiver) = ChannelPublisher::channel();
    let mut dispatcher = Dispatcher::new(publisher, config.name.clone(), config.topic.clone(), "test")
        .with_stats(stats.clone());

    let mut source = LineSource::new(16).with_stats(stats.clone());
    source.start(Cursor::new(input.to_string())).unwrap();

    for observation in source.receiver().iter() {
        stats.record_batch();
        let deltas = tracker.observe(&observation.counts);
        if let Some(notification) = tracker.notification(deltas) {
            dispatcher.dispatch(&notification);
        }
    }

    receiver.try_iter().collect()
}

fn config(keys: &[&str], capacity: i64, combined: bool) -> Config {
    let mut config = Config::default();
    config.name = "cam".to_string();
    config.keys = keys.iter().map(|k| k.to_string()).collect();
    config.default_window_capacity = capacity;
    config.window_overrides.clear();
    config.combine_notifications = combined;
    config
}

#[test]
fn test_flicker_is_smoothed_out() {
    let config = config(&["person"], 3, false);
    // A single spurious detection never wins the window
    let input = [0, 1, 0, 0, 1, 0, 0]
        .iter()
        .map(|v| format!("{{\"person\": {v}}}\n"))
        .collect::<String>();

    assert!(run_pipeline(&config, &input).is_empty());
}

#[test]
fn test_sustained_change_is_published_once() {
    let config = config(&["person", "dog"], 3, false);
    let input = "\
{\"person\": 2}
{\"person\": 2, \"dog\": 1}
{\"person\": 2, \"dog\": 1}
{\"person\": 2}
{\"person\": 2}
";

    let payloads: Vec<String> = run_pipeline(&config, input)
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(
        payloads,
        vec!["cam_person=2", "cam_dog=1", "cam_dog=0"]
    );
}

#[test]
fn test_combined_mode_publishes_snapshots() {
    let config = config(&["person", "dog"], 1, true);
    let input = "{\"person\": 1}\n{\"person\": 1}\n{\"person\": 1, \"dog\": 3}\n";

    let messages = run_pipeline(&config, input);
    let payloads: Vec<&str> = messages.iter().map(|m| m.payload.as_str()).collect();
    assert_eq!(
        payloads,
        vec![r#"{"person":1,"dog":0}"#, r#"{"person":1,"dog":3}"#]
    );
    assert!(messages.iter().all(|m| m.topic == "testml/"));
}

#[test]
fn test_malformed_lines_do_not_advance_windows() {
    let config = config(&["person"], 2, false);
    let input = "{\"person\": 4}\ngarbage\n{\"person\": 4}\n";

    let payloads: Vec<String> = run_pipeline(&config, input)
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(payloads, vec!["cam_person=4"]);
}
