use neurovars::graph::{predefined, NodeId, NodeKind, VarTag};
use neurovars::{Processor, Runtime};
use std::sync::Arc;

fn variable(runtime: &Runtime, tag: VarTag) -> NodeId {
    runtime.graph().add_node(NodeKind::Variable(tag))
}

fn neuron(runtime: &Runtime) -> NodeId {
    runtime.graph().add_node(NodeKind::Neuron)
}

#[test]
fn test_initial_value_evaluated_once() {
    let runtime = Runtime::in_memory();
    let source = variable(&runtime, VarTag::Variable);
    let target = variable(&runtime, VarTag::Variable);
    let first = runtime.graph().create_constant_int(1);
    let second = runtime.graph().create_constant_int(2);
    runtime.add_link(target, source, predefined::INITIAL_VALUE).unwrap();
    runtime.add_link(source, first, predefined::INITIAL_VALUE).unwrap();

    let mut proc = Processor::new(runtime);
    assert_eq!(proc.extract_value(target), vec![first]);

    // Later changes to the source don't re-run the initializer
    proc.store_value(source, &[second]);
    assert_eq!(proc.extract_value(target), vec![first]);

    proc.store_value(target, &[second]);
    assert_eq!(proc.extract_value(target), vec![second]);
}

#[test]
fn test_plain_initial_value_is_singleton() {
    let runtime = Runtime::in_memory();
    let var = variable(&runtime, VarTag::Local);
    let item = neuron(&runtime);
    runtime.add_link(var, item, predefined::INITIAL_VALUE).unwrap();

    let mut proc = Processor::new(runtime);
    assert!(proc.get_value_without_init(var).is_empty());
    assert_eq!(proc.extract_value(var), vec![item]);
    assert_eq!(proc.get_value_without_init(var), vec![item]);
}

#[test]
fn test_split_reactions() {
    let runtime = Runtime::in_memory();
    let graph = runtime.graph().clone();
    let copied = variable(&runtime, VarTag::Variable);
    let emptied = variable(&runtime, VarTag::Local);
    let duplicated = variable(&runtime, VarTag::Variable);
    runtime.add_link(emptied, predefined::EMPTY, predefined::SPLIT_REACTION).unwrap();
    runtime.add_link(duplicated, predefined::DUPLICATE, predefined::SPLIT_REACTION).unwrap();

    let item = neuron(&runtime);
    let other = neuron(&runtime);
    let mut parent = Processor::new(runtime.clone());
    parent.store_value(copied, &[item]);
    parent.store_value(emptied, &[item]);
    parent.store_value(duplicated, &[item]);

    let mut children = parent.split(2);
    assert_eq!(children.len(), 2);

    assert_eq!(children[0].get_value_without_init(copied), vec![item]);
    children[0].store_value(copied, &[other]);
    assert_eq!(parent.get_value_without_init(copied), vec![item]);
    assert_eq!(children[1].get_value_without_init(copied), vec![item]);

    assert!(children[0].get_value_without_init(emptied).is_empty());
    assert_eq!(parent.get_value_without_init(emptied), vec![item]);

    let first_copy = children[0].get_value_without_init(duplicated);
    let second_copy = children[1].get_value_without_init(duplicated);
    assert_eq!(first_copy.len(), 1);
    assert_ne!(first_copy[0], item);
    assert_ne!(first_copy[0], second_copy[0]);
    assert!(matches!(graph.kind(first_copy[0]), Some(NodeKind::Neuron)));
}

#[test]
fn test_globals_shared_across_split() {
    let runtime = Runtime::in_memory();
    let global = variable(&runtime, VarTag::Global);
    let item = neuron(&runtime);

    let parent = Processor::new(runtime);
    let mut children = parent.split(3);
    children[1].store_value(global, &[item]);

    assert_eq!(parent.get_value_without_init(global), vec![item]);
    assert_eq!(children[2].extract_value(global), vec![item]);
}

#[test]
fn test_processors_run_on_threads() {
    let runtime = Runtime::in_memory();
    let global = variable(&runtime, VarTag::Global);
    let local = variable(&runtime, VarTag::Variable);
    let items: Vec<NodeId> = (0..4).map(|_| neuron(&runtime)).collect();

    let parent = Processor::new(runtime.clone());
    let handles: Vec<_> = parent
        .split(4)
        .into_iter()
        .zip(items.clone())
        .map(|(mut proc, item)| {
            std::thread::spawn(move || {
                proc.store_value(local, &[item]);
                proc.store_value(global, &[item]);
                proc.extract_value(local)
            })
        })
        .collect();

    for (handle, item) in handles.into_iter().zip(items.iter()) {
        assert_eq!(handle.join().unwrap(), vec![*item]);
    }
    let last = parent.get_value_without_init(global);
    assert_eq!(last.len(), 1);
    assert!(items.contains(&last[0]));
}

#[test]
fn test_system_variables_are_read_only() {
    let runtime = Runtime::in_memory();
    let from = neuron(&runtime);
    let to = neuron(&runtime);
    let meaning = neuron(&runtime);

    let mut proc = Processor::new(runtime);
    proc.set_current_link(from, to, meaning);
    proc.set_current_info(&[to, meaning]);

    assert_eq!(proc.extract_value(predefined::CURRENT_FROM), vec![from]);
    assert_eq!(proc.extract_value(predefined::CURRENT_TO), vec![to]);
    assert_eq!(proc.extract_value(predefined::CURRENT_MEANING), vec![meaning]);
    assert_eq!(proc.extract_value(predefined::CURRENT_INFO), vec![to, meaning]);
    assert!(proc.extract_value(predefined::CURRENT_SIN).is_empty());

    proc.store_value(predefined::CURRENT_FROM, &[to]);
    assert_eq!(proc.extract_value(predefined::CURRENT_FROM), vec![from]);
    assert_eq!(proc.neuron_to_solve(), from);
}

#[test]
fn test_return_value_consumed_once() {
    let runtime = Runtime::in_memory();
    let result = neuron(&runtime);

    let mut proc = Processor::new(runtime);
    proc.push_return_value(vec![result]);

    assert_eq!(proc.get_value_without_init(predefined::RETURN_VALUE), vec![result]);
    assert_eq!(proc.get_value_without_init(predefined::RETURN_VALUE), vec![result]);
    assert_eq!(proc.extract_value(predefined::RETURN_VALUE), vec![result]);
    assert_eq!(proc.return_value_count(), 0);
    assert!(proc.extract_value(predefined::RETURN_VALUE).is_empty());
}

#[test]
fn test_call_scopes_are_isolated() {
    let runtime = Runtime::in_memory();
    let local = variable(&runtime, VarTag::Local);
    let outer = neuron(&runtime);
    let inner = neuron(&runtime);

    let mut proc = Processor::new(runtime);
    proc.store_value(local, &[outer]);
    proc.enter_call();
    assert!(proc.get_value_without_init(local).is_empty());
    proc.store_value(local, &[inner]);
    assert_eq!(proc.call_depth(), 1);
    assert!(proc.exit_call());
    assert_eq!(proc.get_value_without_init(local), vec![outer]);

    assert!(proc.remove_binding(local));
    assert!(proc.get_value_without_init(local).is_empty());
}

#[test]
fn test_pool_buffers_are_returned() {
    let runtime = Runtime::in_memory();
    let local = variable(&runtime, VarTag::Local);
    let seeded = variable(&runtime, VarTag::Variable);
    let item = neuron(&runtime);
    runtime.add_link(seeded, item, predefined::INITIAL_VALUE).unwrap();

    let run = |runtime: &Arc<Runtime>| {
        let mut proc = Processor::new(runtime.clone());
        proc.enter_call();
        proc.store_value(local, &[item]);
        proc.push_frame();
        proc.get_value(local);
        let value = proc.extract_value(seeded);
        proc.recycle(value);
        let frame = proc.pop_frame();
        proc.recycle(frame);
        proc.exit_call();
        proc.finish();
    };

    run(&runtime);
    let after_first = runtime.pools().node_ids.stats();
    assert!(after_first.idle > 0);

    run(&runtime);
    let after_second = runtime.pools().node_ids.stats();
    assert_eq!(after_second.allocated, after_first.allocated);
    assert!(after_second.reused > after_first.reused);
}

#[test]
fn test_now_cluster_reclaimed_after_lineage_finishes() {
    let runtime = Runtime::in_memory();
    let graph = runtime.graph().clone();

    let mut parent = Processor::new(runtime.clone());
    let cluster = parent.extract_value(predefined::NOW)[0];
    let child = parent.split(1).pop().unwrap();

    parent.finish();
    assert!(graph.contains(cluster));
    assert!(graph.is_frozen(cluster));

    child.finish();
    assert!(!graph.contains(cluster));
    assert_eq!(runtime.time().year_count(), 0);
}

#[test]
fn test_linked_now_cluster_survives() {
    let runtime = Runtime::in_memory();
    let graph = runtime.graph().clone();
    let holder = neuron(&runtime);

    let mut proc = Processor::new(runtime.clone());
    let cluster = proc.extract_value(predefined::NOW)[0];
    runtime.add_link(holder, cluster, predefined::TIME).unwrap();
    proc.finish();

    assert!(graph.contains(cluster));
    assert!(!graph.is_frozen(cluster));
    assert_eq!(runtime.time().year_count(), 1);
}

#[test]
fn test_finish_after_clear_store_leaves_new_nodes_alone() {
    let runtime = Runtime::in_memory();
    let graph = runtime.graph().clone();

    let mut proc = Processor::new(runtime.clone());
    let stale = proc.extract_value(predefined::NOW)[0];
    runtime.clear_store();
    assert!(!graph.contains(stale));

    let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
    let fresh: Vec<NodeId> = (0..4)
        .filter_map(|_| runtime.time().build_short_time_cluster(date, None))
        .collect();
    assert!(fresh.iter().all(|id| *id != stale));

    proc.finish();
    assert!(fresh.iter().all(|id| graph.contains(*id)));
}
