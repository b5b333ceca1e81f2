use std::sync::{Arc, Barrier};
use std::thread;

use callscope::context::{self, Carried, ContextCarrier};
use callscope::domain::Measurement;
use callscope::{Agent, AgentConfig, ChannelCollector};

#[test]
fn test_concurrent_stacks_never_interleave() {
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|n| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let root = context::push(format!("root-{n}"), "t");
                // Both roots are open at the same time
                barrier.wait();
                let child = context::push(format!("child-{n}"), "t");
                barrier.wait();
                let popped_child = context::pop().unwrap();
                let popped_root = context::pop().unwrap();
                assert!(context::pop().is_none());
                (root, child, popped_child, popped_root)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (n, (root, child, popped_child, popped_root)) in results.iter().enumerate() {
        assert_eq!(root.parent_id(), None, "root of thread {n} has a parent");
        assert_eq!(child.parent_id(), Some(root.id()));
        assert_eq!(popped_child.id(), child.id());
        assert_eq!(popped_root.id(), root.id());
    }
    assert_ne!(results[0].0.id(), results[1].0.id());
}

#[test]
fn test_no_implicit_inheritance() {
    let parent = context::push("request", "http");

    let seen = thread::spawn(context::current).join().unwrap();
    assert!(seen.is_none(), "spawned thread inherited {seen:?}");

    assert_eq!(context::pop().map(|c| c.id()), Some(parent.id()));
}

struct Job {
    name: &'static str,
    context: Option<callscope::domain::Context>,
}

impl ContextCarrier for Job {
    fn carried_context(&self) -> Option<&callscope::domain::Context> {
        self.context.as_ref()
    }

    fn carry_context(&mut self, context: Option<callscope::domain::Context>) {
        self.context = context;
    }
}

#[test]
fn test_custom_carrier_hand_off() {
    let (collector, rx) = ChannelCollector::unbounded();
    let agent = Agent::new(AgentConfig::default(), Arc::new(collector));

    let request = agent.scope("request", "http");
    let mut job = Job { name: "resize", context: None };
    job.carry_context(agent.current_context());

    let worker_agent = agent.clone();
    thread::spawn(move || {
        let _root = context::adopt_from(&job);
        let _task = worker_agent.scope(job.name, "worker");
        let _: Result<(), String> = worker_agent.measure("Images", "resize", || Ok(()));
    })
    .join()
    .unwrap();
    let request_id = request.id();
    drop(request);

    let published: Vec<_> = rx.try_iter().collect();
    let method = published
        .iter()
        .find_map(|m| match m {
            Measurement::Method(m) => Some(m),
            _ => None,
        })
        .unwrap();
    let task = published
        .iter()
        .find_map(|m| match m {
            Measurement::Context(c) if c.name() == "resize" => Some(c),
            _ => None,
        })
        .unwrap();

    assert_eq!(task.parent_id(), Some(request_id));
    assert_eq!(method.context_id, Some(task.id()));
}

#[test]
fn test_carried_value_round_trip() {
    context::push("outer", "t");
    let carried = Carried::capture(vec![1, 2, 3]);
    context::pop();

    let (values, parent) = thread::spawn(move || {
        let root = context::adopt_from(&carried);
        assert!(root.is_some());
        let child = context::push("inner", "t");
        context::pop();
        (carried.into_inner(), child.parent_id())
    })
    .join()
    .unwrap();

    assert_eq!(values, vec![1, 2, 3]);
    assert!(parent.is_some());
}
