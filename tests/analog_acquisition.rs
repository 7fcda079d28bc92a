//! End-to-end analog acquisitions against the simulated analog input.

use std::time::Duration;

use tracing_test::traced_test;
use triggered_daq::request::AnalogRequest;
use triggered_daq::sim::{SimulatedAnalogIn, TickScript};
use triggered_daq::trigger::{AnalogTrigger, TriggerIntent};
use triggered_daq::{acquire, AcquisitionError, AcquisitionWarning, InstrumentState};

fn request(trigger: TriggerIntent) -> AnalogRequest {
    AnalogRequest::builder()
        .sample_rate(1000.0)
        .record_length(Duration::from_secs(1))
        .channels(&[0, 1])
        .input_range(10.0)
        .trigger(trigger)
        .build()
        .unwrap()
}

#[test]
fn test_free_running_record() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(1000, 100));
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    assert_eq!(dataset.len(), 1000);
    assert_eq!(dataset.channels().len(), 2);
    assert_eq!(dataset.channels()[0].name, "ch0");
    assert_eq!(dataset.channels()[1].name, "ch1");
    assert!(!dataset.triggered());
    assert!(dataset.is_valid());
    assert!(dataset.is_complete());
    assert!(dataset.warnings().is_empty());
    assert_eq!(dataset.totals().seen, 1000);
    assert_eq!(dataset.time_of_first_sample(), 0.0);

    // apply, then start
    assert_eq!(scope.calls().configure, vec![(true, false), (false, true)]);
    assert_eq!(scope.calls().resets, 0);
    assert_eq!(scope.registers().ranges.get(&0), Some(&10.0));
    assert_eq!(scope.registers().record_length_s, Some(1.0));
}

#[test]
fn test_time_axis_is_uniform() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(1000, 100));
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    let axis = dataset.time_axis();
    for (i, t) in axis.iter().enumerate() {
        let expected = i as f64 / dataset.sample_rate_actual();
        assert!((t - expected).abs() < 1e-9, "row {}: {} != {}", i, t, expected);
    }
}

#[test]
fn test_samples_follow_the_waveform() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(1000, 100));
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    // default waveform is a 1 V, 50 Hz sine; channel 1 is a quarter period ahead
    let ch0 = dataset.channel(0).unwrap();
    let ch1 = dataset.channel(1).unwrap();
    assert!(ch0[0].abs() < 1e-9);
    assert!((ch0[5] - 1.0).abs() < 1e-9);
    assert!((ch1[0] - 1.0).abs() < 1e-9);

    let summary = dataset.summary();
    assert_eq!(summary[0].samples, 1000);
    assert_eq!(summary[0].placeholders, 0);
    assert!(summary[0].mean.abs() < 1e-9);
    assert!((summary[0].std_dev - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
}

#[test]
#[traced_test]
fn test_lost_samples_become_placeholders() {
    let script = TickScript::streaming(1000, 100).with_loss_at(3, 5);
    let mut scope = SimulatedAnalogIn::new(2, script);
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    assert_eq!(dataset.len(), 1005);
    assert_eq!(dataset.totals().lost, 5);
    assert!(!dataset.is_valid());
    assert_eq!(dataset.placeholder_count(0), 5);
    assert_eq!(dataset.placeholder_count(1), 5);

    // lost samples precede the data of the tick that reported them
    let ch0 = dataset.channel(0).unwrap();
    assert!(ch0[299].is_finite());
    assert!(ch0[300..305].iter().all(|v| v.is_nan()));
    assert!(ch0[305].is_finite());

    assert_eq!(
        dataset.warnings(),
        &[AcquisitionWarning::SamplesLost { count: 5 }]
    );
    assert!(logs_contain("Samples were lost"));
}

#[test]
fn test_corruption_invalidates_without_placeholders() {
    let script = TickScript::streaming(1000, 100).with_corruption_at(1, 4);
    let mut scope = SimulatedAnalogIn::new(2, script);
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    assert_eq!(dataset.len(), 1000);
    assert_eq!(dataset.totals().corrupted, 4);
    assert!(!dataset.is_valid());
    assert_eq!(dataset.placeholder_count(0), 0);
    assert_eq!(
        dataset.warnings()[0].to_string(),
        "4 samples could be corrupted, reduce the sample rate"
    );
}

#[test]
fn test_short_record_is_flagged_incomplete() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(600, 100));
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    assert_eq!(dataset.len(), 600);
    assert!(dataset.is_valid());
    assert!(!dataset.is_complete());
    assert_eq!(
        dataset.warnings(),
        &[AcquisitionWarning::Incomplete {
            collected: 600,
            target: 1000
        }]
    );
}

#[test]
fn test_triggered_record_keeps_pre_roll() {
    let script = TickScript::streaming(1000, 100).with_pre_trigger(2, 50);
    let mut scope = SimulatedAnalogIn::new(2, script);
    let trigger = TriggerIntent::analog(AnalogTrigger::on_channel(0).with_level(0.2));
    let dataset = acquire(&mut scope, &request(trigger)).unwrap();

    assert!(dataset.triggered());
    assert_eq!(dataset.totals().seen, 1000);
    assert_eq!(dataset.pre_trigger_samples(), 100);
    assert_eq!(dataset.len(), 1100);
    assert!((dataset.time_of_first_sample() + 0.1).abs() < 1e-9);
    // the first post-trigger row sits on t = 0
    assert!(dataset.time_axis()[100].abs() < 1e-9);

    let registers = scope.registers().analog_trigger.clone().unwrap();
    assert_eq!(registers.channel, 0);
    assert_eq!(registers.level, 0.2);
    assert!((registers.position_s + 0.1).abs() < 1e-12);
}

#[test]
fn test_waits_until_ready() {
    let script = TickScript::streaming(1000, 100).with_ready_after(3);
    let mut scope = SimulatedAnalogIn::new(2, script);
    acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    assert_eq!(scope.calls().ready_polls, 4);
    assert_eq!(scope.calls().ticks, 10);
}

#[test]
fn test_trigger_timeout_resets_once() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::never_triggers(4));
    let trigger = TriggerIntent::analog(AnalogTrigger::on_channel(1)).with_retry_budget(10);
    let err = acquire(&mut scope, &request(trigger)).unwrap_err();

    // 10 -> 6 -> 2 -> -2
    assert!(matches!(
        err,
        AcquisitionError::TriggerTimeout { samples_waited: 12 }
    ));
    assert!(err.is_aborted_run());
    assert_eq!(scope.calls().ticks, 3);
    assert_eq!(scope.calls().resets, 1);
    assert!(scope.registers().analog_trigger.is_none());
}

#[test]
fn test_out_of_range_input_writes_nothing() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(1000, 100));
    let request = AnalogRequest::builder()
        .channels(&[0, 1])
        .input_ranges(&[5.0, 100.0])
        .build()
        .unwrap();

    let err = acquire(&mut scope, &request).unwrap_err();
    assert!(matches!(
        err,
        AcquisitionError::InvalidInputRange { range, .. } if range == 100.0
    ));
    assert!(err.is_validation());
    assert!(scope.registers().ranges.is_empty());
    assert!(scope.calls().configure.is_empty());
    assert_eq!(scope.calls().resets, 0);
}

#[test]
fn test_unknown_channel_is_rejected() {
    let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(1000, 100));
    let request = AnalogRequest::builder().channels(&[0, 2]).build().unwrap();

    let err = acquire(&mut scope, &request).unwrap_err();
    assert!(matches!(
        err,
        AcquisitionError::InvalidChannel {
            channel: 2,
            available: 2
        }
    ));
    assert_eq!(scope.calls().ticks, 0);
}

#[test]
fn test_scripted_done_state_ends_the_run() {
    let script = TickScript::from_ticks([
        triggered_daq::sim::ScriptedTick::running(300),
        triggered_daq::sim::ScriptedTick::new(
            InstrumentState::Done,
            triggered_daq::instrument::RecordCounts::new(0, 0, 0),
        ),
        triggered_daq::sim::ScriptedTick::running(300),
    ]);
    let mut scope = SimulatedAnalogIn::new(2, script);
    let dataset = acquire(&mut scope, &request(TriggerIntent::disabled())).unwrap();

    assert_eq!(dataset.len(), 300);
    assert_eq!(scope.script_remaining(), 1);
}
