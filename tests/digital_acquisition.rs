//! End-to-end digital acquisitions against the simulated logic input.

use std::time::Duration;

use triggered_daq::request::DigitalRequest;
use triggered_daq::sim::{BitPattern, SimulatedDigitalIn, TickScript};
use triggered_daq::trigger::{DigitalTriggerKind, TriggerIntent};
use triggered_daq::{acquire, AcquisitionError};

fn request(channels: &[u32], trigger: TriggerIntent) -> DigitalRequest {
    DigitalRequest::builder()
        .sample_rate(1000.0)
        .record_length(Duration::from_millis(500))
        .channels(channels)
        .trigger(trigger)
        .build()
        .unwrap()
}

#[test]
fn test_bits_are_decoded_per_channel() {
    let mut logic = SimulatedDigitalIn::new(16, TickScript::streaming(500, 50));
    let dataset = acquire(&mut logic, &request(&[0, 1, 3], TriggerIntent::disabled())).unwrap();

    assert_eq!(dataset.len(), 500);
    assert!(dataset.is_valid());
    // counter pattern: sample i carries the value i
    let ch0 = dataset.channel(0).unwrap();
    let ch1 = dataset.channel(1).unwrap();
    let ch3 = dataset.channel(3).unwrap();
    for i in 0..500usize {
        assert_eq!(ch0[i], Some(i & 1 != 0));
        assert_eq!(ch1[i], Some(i & 2 != 0));
        assert_eq!(ch3[i], Some(i & 8 != 0));
    }
}

#[test]
fn test_constant_pattern() {
    let script = TickScript::streaming(100, 100);
    let mut logic = SimulatedDigitalIn::new(8, script).with_pattern(BitPattern::Constant(0b0101));
    let dataset = acquire(&mut logic, &request(&[0, 1, 2], TriggerIntent::disabled())).unwrap();

    assert!(dataset.channel(0).unwrap().iter().all(|v| *v == Some(true)));
    assert!(dataset.channel(1).unwrap().iter().all(|v| *v == Some(false)));
    assert!(dataset.channel(2).unwrap().iter().all(|v| *v == Some(true)));

    let summary = dataset.summary();
    assert_eq!(summary[0].mean, 1.0);
    assert_eq!(summary[1].mean, 0.0);
}

#[test]
fn test_stops_once_target_is_exceeded() {
    let mut logic = SimulatedDigitalIn::new(16, TickScript::continuous(100));
    let dataset = acquire(&mut logic, &request(&[0], TriggerIntent::disabled())).unwrap();

    // 500 samples requested; the tick that crosses the target is kept whole
    assert_eq!(logic.calls().ticks, 6);
    assert_eq!(dataset.len(), 600);
    assert_eq!(dataset.totals().seen, 600);
    assert!(dataset.is_complete());
    assert!(dataset.warnings().is_empty());
}

#[test]
fn test_clock_and_buffer_registers() {
    let mut logic = SimulatedDigitalIn::new(16, TickScript::streaming(500, 50));
    let request = DigitalRequest::builder()
        .sample_rate(3000.0)
        .record_length(Duration::from_millis(100))
        .channels(&[0])
        .buffer_size(1024)
        .build()
        .unwrap();
    let dataset = acquire(&mut logic, &request).unwrap();

    assert_eq!(logic.registers().divider, Some(33333));
    assert_eq!(logic.registers().buffer_size, Some(1024));
    assert_eq!(dataset.sample_rate_actual(), 3000.0);
}

#[test]
fn test_triggered_record() {
    let script = TickScript::streaming(500, 50).with_pre_trigger(2, 50);
    let mut logic = SimulatedDigitalIn::new(16, script);
    let trigger = TriggerIntent::digital(vec![DigitalTriggerKind::RisingEdge]);
    let dataset = acquire(&mut logic, &request(&[0, 1, 2], trigger)).unwrap();

    assert!(dataset.triggered());
    assert_eq!(dataset.totals().seen, 500);
    assert_eq!(dataset.pre_trigger_samples(), 100);
    assert_eq!(dataset.len(), 600);

    let registers = logic.registers().digital_trigger.unwrap();
    assert_eq!(registers.masks.edge_rise, 0b111);
    assert_eq!(registers.masks.level_high, 0);
    assert_eq!(registers.prefill, 50);
}

#[test]
fn test_trigger_timeout_resets_once() {
    let mut logic = SimulatedDigitalIn::new(8, TickScript::never_triggers(4));
    let trigger =
        TriggerIntent::digital(vec![DigitalTriggerKind::RisingEdge]).with_retry_budget(10);

    let err = acquire(&mut logic, &request(&[0, 1], trigger)).unwrap_err();
    assert!(matches!(err, AcquisitionError::TriggerTimeout { samples_waited: 12 }));
    assert_eq!(logic.calls().ticks, 3);
    assert_eq!(logic.calls().resets, 1);
    assert!(logic.registers().digital_trigger.is_none());
}

#[test]
fn test_disabled_digital_trigger_does_not_gate() {
    let mut logic = SimulatedDigitalIn::new(16, TickScript::streaming(500, 50));
    let trigger = TriggerIntent::digital(vec![DigitalTriggerKind::Disabled]);
    let dataset = acquire(&mut logic, &request(&[0, 1], trigger)).unwrap();

    assert!(!dataset.triggered());
    assert_eq!(dataset.totals().seen, 500);
    assert_eq!(logic.registers().digital_trigger.unwrap().masks.any(), 0);
}

#[test]
fn test_lost_samples_are_none() {
    let script = TickScript::streaming(500, 50).with_loss_at(0, 3);
    let mut logic = SimulatedDigitalIn::new(16, script);
    let dataset = acquire(&mut logic, &request(&[0], TriggerIntent::disabled())).unwrap();

    let ch0 = dataset.channel(0).unwrap();
    assert_eq!(&ch0[..3], &[None, None, None]);
    assert!(ch0[3].is_some());
    assert!(!dataset.is_valid());
    assert_eq!(dataset.placeholder_count(0), 3);
    assert_eq!(dataset.summary()[0].placeholders, 3);
}

#[test]
fn test_sample_rate_above_clock() {
    let mut logic = SimulatedDigitalIn::new(16, TickScript::streaming(500, 50));
    let request = DigitalRequest::builder()
        .sample_rate(2e8)
        .record_length(Duration::from_millis(1))
        .build()
        .unwrap();

    let err = acquire(&mut logic, &request).unwrap_err();
    assert!(matches!(err, AcquisitionError::SampleRateOutOfRange { .. }));
    assert!(logic.registers().divider.is_none());
}

#[test]
fn test_sample_rate_below_divider_range() {
    let mut logic =
        SimulatedDigitalIn::new(16, TickScript::streaming(500, 50)).with_max_divider(1000);
    let request = DigitalRequest::builder()
        .sample_rate(10.0)
        .record_length(Duration::from_secs(1))
        .build()
        .unwrap();

    match acquire(&mut logic, &request).unwrap_err() {
        AcquisitionError::SampleRateOutOfRange { requested, min, max } => {
            assert_eq!(requested, 10.0);
            assert_eq!(min, 100_000.0);
            assert_eq!(max, 100e6);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_trigger_count_mismatch_is_a_validation_error() {
    let mut logic = SimulatedDigitalIn::new(16, TickScript::streaming(500, 50));
    let trigger = TriggerIntent::digital(vec![DigitalTriggerKind::High, DigitalTriggerKind::Low]);

    let err = acquire(&mut logic, &request(&[0, 1, 2], trigger)).unwrap_err();
    assert!(matches!(
        err,
        AcquisitionError::TriggerCountMismatch {
            triggers: 2,
            channels: 3
        }
    ));
    assert!(err.is_validation());
    assert!(logic.calls().configure.is_empty());
    assert_eq!(logic.calls().resets, 0);
}

#[test]
fn test_divider_read_back_mismatch_resets() {
    let mut logic =
        SimulatedDigitalIn::new(16, TickScript::streaming(500, 50)).with_divider_read_back(7);

    let err = acquire(&mut logic, &request(&[0], TriggerIntent::disabled())).unwrap_err();
    assert!(matches!(err, AcquisitionError::Instrument(_)));
    assert_eq!(logic.calls().resets, 1);
    assert_eq!(logic.calls().ticks, 0);
}
