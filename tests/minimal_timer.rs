mod common;

use std::{thread, time::Duration};

use common::{capture, spinning, wait_until};
use ros2_reentrant_node::{
    Context, ExecutorOptions, MultiThreadedExecutor, SpinOptions,
    minimal_timer::{MinimalTimer, MinimalTimerConfig},
    msg::std_msgs::msg::String as StringMsg,
};

const ENTERING: &str = "entering timer_callback";
const LEAVING: &str = "leaving timer_callback";
const HEARD: &str = "I heard---:";

fn executor() -> MultiThreadedExecutor {
    Context::new().create_executor(ExecutorOptions::new().num_threads(4))
}

// A timer that will not fire during the test, so only the subscription speaks.
fn quiet_config(node_name: &str) -> MinimalTimerConfig {
    MinimalTimerConfig::default()
        .with_node_name(node_name)
        .with_timer_period(Duration::from_secs(3600))
        .with_workload_iterations(0)
}

#[test]
fn hears_hello_on_topic() {
    let log = capture();
    let executor = executor();
    let _node = MinimalTimer::new_node(&executor, quiet_config("hello_listener")).unwrap();
    let talker = executor.create_node("hello_talker").unwrap();
    let publisher = talker.create_publisher::<StringMsg>("topic").unwrap();

    let (delivered, heard) = spinning(&executor, || {
        let delivered = publisher.publish(&"hello".into());
        let heard = wait_until(Duration::from_secs(2), || {
            log.count("hello_listener", "I heard---: 'hello'") == 1
        });
        (delivered, heard)
    });

    assert_eq!(delivered.unwrap(), 1);
    assert!(heard, "no log line for the published message");
    assert_eq!(
        log.messages("hello_listener"),
        vec!["I heard---: 'hello'".to_owned()]
    );
}

#[test]
fn ignores_messages_published_before_subscribing() {
    let log = capture();
    let executor = executor();
    let talker = executor.create_node("early_talker").unwrap();
    let publisher = talker.create_publisher::<StringMsg>("topic").unwrap();
    assert_eq!(publisher.publish(&"too early".into()).unwrap(), 0);

    let _node = MinimalTimer::new_node(&executor, quiet_config("early_listener")).unwrap();

    let heard = spinning(&executor, || {
        publisher.publish(&"on time".into()).unwrap();
        wait_until(Duration::from_secs(2), || {
            log.count("early_listener", HEARD) == 1
        })
    });

    assert!(heard);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        log.messages("early_listener"),
        vec!["I heard---: 'on time'".to_owned()]
    );
}

#[test]
fn depth_one_keeps_only_the_latest_message() {
    let log = capture();
    let executor = executor();
    let node = MinimalTimer::new_node(&executor, quiet_config("latest_listener")).unwrap();
    let publisher = node
        .node()
        .create_publisher::<StringMsg>("/topic")
        .unwrap();

    for payload in ["one", "two", "three"] {
        assert_eq!(publisher.publish(&payload.into()).unwrap(), 1);
    }
    assert_eq!(node.subscription().pending_messages(), 1);
    assert_eq!(node.subscription().dropped_messages(), 2);

    executor
        .spin(SpinOptions::new().timeout(Duration::from_millis(200)))
        .unwrap();

    assert_eq!(
        log.messages("latest_listener"),
        vec!["I heard---: 'three'".to_owned()]
    );
}

#[test]
fn timer_fires_about_every_period() {
    let log = capture();
    let executor = executor();
    let config = MinimalTimerConfig::default()
        .with_node_name("periodic_timer")
        .with_timer_period(Duration::from_millis(50))
        .with_workload_iterations(1_000);
    let node = MinimalTimer::new_node(&executor, config).unwrap();

    executor
        .spin(SpinOptions::new().timeout(Duration::from_millis(525)))
        .unwrap();

    let entered = log.count("periodic_timer", ENTERING);
    assert!(
        (6..=12).contains(&entered),
        "expected about 10 timer callbacks, saw {entered}"
    );
    assert!(node.timer().trigger_count() >= entered as u64);
    drop(node);
    assert_eq!(log.count("periodic_timer", LEAVING), entered);
}

#[test]
fn subscription_runs_while_timer_callback_is_busy() {
    let log = capture();
    let executor = executor();
    let config = MinimalTimerConfig::default()
        .with_node_name("busy_timer")
        .with_timer_period(Duration::from_millis(50))
        .with_workload_iterations(50_000_000);
    let node = MinimalTimer::new_node(&executor, config).unwrap();
    let publisher = node.node().create_publisher::<StringMsg>("topic").unwrap();

    let heard = spinning(&executor, || {
        let entered = wait_until(Duration::from_secs(5), || {
            log.count("busy_timer", ENTERING) >= 1
        });
        // Keep further expirations from occupying the remaining workers.
        node.timer().stop();
        publisher.publish(&"meanwhile".into()).unwrap();
        let heard = wait_until(Duration::from_secs(5), || log.count("busy_timer", HEARD) == 1);
        entered && heard
    });
    assert!(heard);

    // The message was handled between the first entering/leaving pair.
    let messages = log.messages("busy_timer");
    let first_entering = messages.iter().position(|m| m == ENTERING).unwrap();
    let first_leaving = messages.iter().position(|m| m == LEAVING);
    let heard_at = messages.iter().position(|m| m.starts_with(HEARD)).unwrap();
    assert!(first_entering < heard_at);
    if let Some(first_leaving) = first_leaving {
        assert!(heard_at < first_leaving, "log order: {messages:?}");
    }
    drop(node);
}

#[test]
fn dropping_the_node_cancels_its_callbacks() {
    let log = capture();
    let executor = executor();
    let config = MinimalTimerConfig::default()
        .with_node_name("doomed_timer")
        .with_timer_period(Duration::from_millis(10))
        .with_workload_iterations(0);
    let node = MinimalTimer::new_node(&executor, config).unwrap();
    let talker = executor.create_node("doomed_talker").unwrap();
    let publisher = talker.create_publisher::<StringMsg>("topic").unwrap();

    let (fired, after_drop, delivered) = spinning(&executor, || {
        let fired = wait_until(Duration::from_secs(2), || {
            log.count("doomed_timer", LEAVING) >= 2
        });
        drop(node);
        let after_drop = log.messages("doomed_timer").len();
        let delivered = publisher.publish(&"anyone there".into());
        thread::sleep(Duration::from_millis(100));
        (fired, after_drop, delivered)
    });

    assert!(fired);
    assert_eq!(delivered.unwrap(), 0);
    assert_eq!(log.messages("doomed_timer").len(), after_drop);
    assert_eq!(log.count("doomed_timer", HEARD), 0);
    assert_eq!(
        log.count("doomed_timer", ENTERING),
        log.count("doomed_timer", LEAVING)
    );
}

#[test]
fn shutdown_ends_a_blocking_spin() {
    let executor = executor();
    let _node = MinimalTimer::new_node(&executor, quiet_config("shutdown_node")).unwrap();

    thread::scope(|scope| {
        let spinner = scope.spawn(|| executor.spin(SpinOptions::default()));
        thread::sleep(Duration::from_millis(50));
        executor.context().shutdown();
        spinner.join().unwrap().unwrap();
    });
    assert!(executor.context().is_shutdown());
}
