use pultrusion_communication::{
    memory_link, stop_channel, CommandDispatcher, DebouncedControl, DeviceEnd, ShutdownState,
    ShutdownTimer, StopHandle, TemperatureRequest, TemperatureSetter, TemperatureState,
};
use pultrusion_core::{
    Actuator, ControlError, ControlEvent, DeviceEvent, EventBus, EventCategory, EventFilter,
    RigEvent,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    bus: Arc<EventBus>,
    device: DeviceEnd,
    fan: Arc<DebouncedControl>,
    winder: Arc<DebouncedControl>,
    temperature: Arc<TemperatureSetter>,
    timer: Arc<ShutdownTimer>,
    stop: StopHandle,
}

fn harness() -> Harness {
    let (channel, device) = memory_link("mem");
    let (_rx, tx) = channel.split();
    let bus = Arc::new(EventBus::new());
    let dispatcher = Arc::new(CommandDispatcher::new(tx, bus.clone()));
    let (stop, signal) = stop_channel();
    let window = Duration::from_millis(200);

    let fan = Arc::new(DebouncedControl::new(Actuator::Fan, 50, window, dispatcher.clone()));
    let winder = Arc::new(DebouncedControl::new(
        Actuator::Winder,
        50,
        window,
        dispatcher.clone(),
    ));
    fan.spawn(signal.clone());
    winder.spawn(signal.clone());

    let temperature = Arc::new(TemperatureSetter::new(
        dispatcher.clone(),
        100,
        Duration::from_secs(5),
        signal.clone(),
    ));
    let timer = Arc::new(ShutdownTimer::new(
        dispatcher,
        Duration::from_secs(1),
        fan.clone(),
        winder.clone(),
        temperature.clone(),
        signal,
    ));

    Harness {
        bus,
        device,
        fan,
        winder,
        temperature,
        timer,
        stop,
    }
}

fn ack(bus: &EventBus, value: i32) {
    bus.publish(RigEvent::Device(DeviceEvent::TemperatureAck { value }))
        .ok();
}

#[tokio::test(start_paused = true)]
async fn test_burst_within_window_sends_last_value_once() {
    let h = harness();

    for value in [5, 17, 42, 63, 30] {
        h.fan.set(value).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(h.device.take_lines(), vec!["SET_FAN_PWM:179"]);
    assert_eq!(h.fan.last_committed(), Some(30));
}

#[tokio::test(start_paused = true)]
async fn test_separate_windows_send_separately() {
    let h = harness();

    h.winder.set(100).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.winder.set(0).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(
        h.device.take_lines(),
        vec!["SET_WINDER_PWM:1", "SET_WINDER_PWM:255"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_apply_sends_immediately() {
    let h = harness();

    h.fan.set(0).unwrap();
    assert_eq!(h.fan.apply_now().unwrap(), 255);
    assert_eq!(h.device.take_lines(), vec!["SET_FAN_PWM:255"]);

    // The pending slider value was consumed by the manual apply.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.device.take_lines().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_two_controls_share_the_link() {
    let h = harness();

    h.fan.set(100).unwrap();
    h.winder.set(100).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut lines = h.device.take_lines();
    lines.sort();
    assert_eq!(lines, vec!["SET_FAN_PWM:1", "SET_WINDER_PWM:1"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_temperature_sent_once() {
    let h = harness();

    assert!(matches!(
        h.temperature.request(190).unwrap(),
        TemperatureRequest::Sent(_)
    ));
    assert!(matches!(
        h.temperature.request(190).unwrap(),
        TemperatureRequest::AlreadySet
    ));
    assert_eq!(h.device.take_lines(), vec!["SET_TEMP:190"]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_permits_fresh_request() {
    let h = harness();
    let mut events = h
        .bus
        .subscribe(EventFilter::Categories(vec![EventCategory::Control]));

    let TemperatureRequest::Sent(handle) = h.temperature.request(190).unwrap() else {
        panic!("first request should be sent");
    };
    assert_eq!(
        handle.wait().await,
        Err(ControlError::AckTimeout {
            expected: 190,
            timeout_ms: 5000,
        })
    );
    assert_eq!(h.temperature.state(), TemperatureState::Idle);

    let mut timed_out = false;
    while let Some(event) = events.try_next() {
        if matches!(
            event,
            RigEvent::Control(ControlEvent::TemperatureTimedOut { value: 190 })
        ) {
            timed_out = true;
        }
    }
    assert!(timed_out);

    assert!(matches!(
        h.temperature.request(190).unwrap(),
        TemperatureRequest::Sent(_)
    ));
    assert_eq!(h.device.take_lines(), vec!["SET_TEMP:190", "SET_TEMP:190"]);
}

#[tokio::test(start_paused = true)]
async fn test_ack_confirms_and_rearms() {
    let h = harness();

    let TemperatureRequest::Sent(handle) = h.temperature.request(230).unwrap() else {
        panic!("request should be sent");
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    ack(&h.bus, 230);
    assert_eq!(handle.wait().await, Ok(230));
    assert_eq!(h.temperature.state(), TemperatureState::Idle);

    // A confirmed value is forgotten, so asking again sends again.
    assert!(matches!(
        h.temperature.request(230).unwrap(),
        TemperatureRequest::Sent(_)
    ));
    assert_eq!(h.device.take_lines(), vec!["SET_TEMP:230", "SET_TEMP:230"]);
}

#[tokio::test(start_paused = true)]
async fn test_ack_for_other_value_is_ignored() {
    let h = harness();

    let TemperatureRequest::Sent(handle) = h.temperature.request(200).unwrap() else {
        panic!("request should be sent");
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    ack(&h.bus, 2000);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        h.temperature.state(),
        TemperatureState::AwaitingAck(pending) if pending.expected_temp == 200
    ));

    assert!(matches!(
        handle.wait().await,
        Err(ControlError::AckTimeout { expected: 200, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_expires_and_zeroes_displays() {
    let h = harness();

    assert_eq!(h.timer.start(1), Ok(60));
    assert_eq!(h.device.take_lines(), vec!["SET_SHUTDOWN_TIME:60"]);

    tokio::time::sleep(Duration::from_millis(59_500)).await;
    assert_eq!(
        h.timer.state(),
        ShutdownState::Running {
            remaining_seconds: 1
        }
    );

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(h.timer.state(), ShutdownState::Idle);
    assert_eq!(h.fan.value(), 0);
    assert_eq!(h.winder.value(), 0);
    assert_eq!(h.temperature.desired(), 0);

    // Expiry only changes the displays.
    assert!(h.device.take_written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_start_rejected_while_running() {
    let h = harness();
    let mut events = h
        .bus
        .subscribe(EventFilter::Categories(vec![EventCategory::Control]));

    h.timer.start(5).unwrap();
    h.device.take_lines();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert_eq!(
        h.timer.start(1),
        Err(ControlError::ShutdownAlreadyRunning {
            remaining_seconds: 298
        })
    );
    assert!(h.device.take_written().is_empty());
    assert_eq!(
        h.timer.state(),
        ShutdownState::Running {
            remaining_seconds: 298
        }
    );

    let mut rejected = false;
    while let Some(event) = events.try_next() {
        if matches!(
            event,
            RigEvent::Control(ControlEvent::ShutdownRejected { .. })
        ) {
            rejected = true;
        }
    }
    assert!(rejected);
}

#[tokio::test(start_paused = true)]
async fn test_stop_signal_halts_debounce() {
    let h = harness();
    h.stop.stop();
    tokio::task::yield_now().await;

    h.fan.set(10).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.device.take_written().is_empty());
}
