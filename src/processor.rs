//! The evaluation context threaded through variable reads and writes.

use crate::graph::{predefined, NodeId};
use crate::runtime::Runtime;
use crate::time::Freezer;
use crate::vars::{Binding, NodeList, Scalar, ScopeTier, SplitReaction, SystemVar, ValueKind, VarRef, VarScope, Variable};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Nested initial-value evaluations allowed before giving up on a cycle
const MAX_EVAL_DEPTH: usize = 64;

/// State shared by a processor and every processor split from it.
struct Lineage {
    runtime: Arc<Runtime>,
    globals: Mutex<VarScope>,
    frozen: Mutex<Vec<NodeId>>,
}

impl Drop for Lineage {
    fn drop(&mut self) {
        let frozen = std::mem::take(&mut *self.frozen.lock());
        if frozen.is_empty() {
            return;
        }
        let time = self.runtime.time();
        for id in frozen {
            self.runtime.graph().set_frozen(id, false);
            time.reclaim_if_unused(id);
        }
    }
}

pub struct Processor {
    runtime: Arc<Runtime>,
    lineage: Arc<Lineage>,
    stack: Vec<NodeList>,
    variable_values: Vec<VarScope>,
    last_return_values: Vec<NodeList>,
    neuron_to_solve: NodeId,
    current_to: NodeId,
    current_meaning: NodeId,
    current_sin: NodeId,
    current_info: NodeList,
    eval_depth: usize,
}

impl Processor {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let root_frame = runtime.pools().node_ids.get_buffer();
        Self {
            lineage: Arc::new(Lineage {
                runtime: runtime.clone(),
                globals: Mutex::new(VarScope::new()),
                frozen: Mutex::new(Vec::new()),
            }),
            runtime,
            stack: vec![root_frame],
            variable_values: vec![VarScope::new()],
            last_return_values: Vec::new(),
            neuron_to_solve: NodeId::EMPTY,
            current_to: NodeId::EMPTY,
            current_meaning: NodeId::EMPTY,
            current_sin: NodeId::EMPTY,
            current_info: NodeList::new(),
            eval_depth: 0,
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    fn empty_list(&self) -> NodeList {
        self.runtime.pools().node_ids.get_buffer()
    }

    fn single(&self, id: NodeId) -> NodeList {
        let mut list = self.empty_list();
        if !id.is_empty() {
            list.push(id);
        }
        list
    }

    /// Hands a list obtained from this processor back to the pool.
    pub fn recycle(&self, list: NodeList) {
        self.runtime.pools().node_ids.recycle(list);
    }

    // Argument stack

    pub fn push_frame(&mut self) {
        let frame = self.empty_list();
        self.stack.push(frame);
    }

    /// Pops the top argument frame. The root frame stays in place.
    pub fn pop_frame(&mut self) -> NodeList {
        if self.stack.len() > 1 {
            if let Some(frame) = self.stack.pop() {
                return frame;
            }
        }
        log::error!("Can't pop the root argument frame");
        self.empty_list()
    }

    pub fn push_value(&mut self, id: NodeId) {
        self.push_values(&[id]);
    }

    pub fn push_values(&mut self, ids: &[NodeId]) {
        if let Some(frame) = self.stack.last_mut() {
            frame.extend_from_slice(ids);
        }
    }

    pub fn peek(&self) -> &[NodeId] {
        self.stack.last().map(|frame| frame.as_slice()).unwrap_or(&[])
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // Call scopes

    pub fn enter_call(&mut self) {
        self.variable_values.push(VarScope::new());
    }

    /// Unwinds the innermost call scope, releasing its bindings.
    pub fn exit_call(&mut self) -> bool {
        if self.variable_values.len() <= 1 {
            log::error!("exit_call without a matching enter_call");
            return false;
        }
        if let Some(mut scope) = self.variable_values.pop() {
            let pool = &self.runtime.pools().node_ids;
            scope.drain_lists().for_each(|list| pool.recycle(list));
        }
        true
    }

    /// Number of call scopes above the root scope.
    pub fn call_depth(&self) -> usize {
        self.variable_values.len().saturating_sub(1)
    }

    fn top_scope(&mut self) -> &mut VarScope {
        if self.variable_values.is_empty() {
            self.variable_values.push(VarScope::new());
        }
        let last = self.variable_values.len() - 1;
        &mut self.variable_values[last]
    }

    // Context fields

    pub fn push_return_value(&mut self, values: NodeList) {
        self.last_return_values.push(values);
    }

    pub fn return_value_count(&self) -> usize {
        self.last_return_values.len()
    }

    pub fn set_current_link(&mut self, from: NodeId, to: NodeId, meaning: NodeId) {
        self.neuron_to_solve = from;
        self.current_to = to;
        self.current_meaning = meaning;
    }

    pub fn set_current_sin(&mut self, sin: NodeId) {
        self.current_sin = sin;
    }

    pub fn set_current_info(&mut self, info: &[NodeId]) {
        self.current_info.clear();
        self.current_info.extend_from_slice(info);
    }

    pub fn neuron_to_solve(&self) -> NodeId { self.neuron_to_solve }
    pub fn current_to(&self) -> NodeId { self.current_to }
    pub fn current_meaning(&self) -> NodeId { self.current_meaning }
    pub fn current_sin(&self) -> NodeId { self.current_sin }
    pub fn current_info(&self) -> &[NodeId] { &self.current_info }

    // Variable access by node id

    fn resolve(&self, id: NodeId) -> Option<Arc<VarRef>> {
        let resolved = self.runtime.variable(id);
        if resolved.is_none() {
            log::error!("Node {:?} is not a variable", id);
        }
        resolved
    }

    pub fn extract_value(&mut self, var: NodeId) -> NodeList {
        match self.resolve(var) {
            Some(resolved) => resolved.extract_value(self),
            None => self.empty_list(),
        }
    }

    pub fn get_value(&mut self, var: NodeId) {
        if let Some(resolved) = self.resolve(var) {
            resolved.get_value(self);
        }
    }

    pub fn get_value_without_init(&self, var: NodeId) -> NodeList {
        match self.resolve(var) {
            Some(resolved) => resolved.get_value_without_init(self),
            None => NodeList::new(),
        }
    }

    pub fn store_value(&mut self, var: NodeId, values: &[NodeId]) {
        if let Some(resolved) = self.resolve(var) {
            resolved.store_value(self, values);
        }
    }

    /// First bound node read according to the variable's declared value kind.
    pub fn extract_scalar(&mut self, var: NodeId) -> Scalar {
        let Some(resolved) = self.resolve(var) else {
            return Scalar::None;
        };
        let graph = self.runtime.graph().clone();
        let kind = resolved
            .variable()
            .map_or(ValueKind::None, |v| v.value_kind(&graph));
        if kind == ValueKind::None {
            log::error!("Variable {:?} has no value type marker", var);
            return Scalar::None;
        }

        let values = resolved.extract_value(self);
        let result = match (kind, values.first().copied()) {
            (ValueKind::Int, first) => Scalar::Int(first.and_then(|n| graph.int_value(n)).unwrap_or_default()),
            (ValueKind::Double, first) => Scalar::Double(first.and_then(|n| graph.double_value(n)).unwrap_or_default()),
            (ValueKind::Bool, first) => Scalar::Bool(first == Some(predefined::TRUE)),
            (ValueKind::None, _) => Scalar::None,
        };
        self.recycle(values);
        result
    }

    /// Value of an arbitrary node: variables are read, anything else is
    /// returned as a single item.
    pub fn evaluate(&mut self, node: NodeId) -> NodeList {
        let Some(resolved) = self.runtime.variable(node) else {
            return self.single(node);
        };
        if self.eval_depth >= MAX_EVAL_DEPTH {
            log::error!("Initial value chain through {:?} is too deep, probably cyclic", node);
            return self.empty_list();
        }
        self.eval_depth += 1;
        let result = resolved.extract_value(self);
        self.eval_depth -= 1;
        result
    }

    // Stored variable mechanics

    pub(crate) fn binding(&self, var: &Variable) -> Option<Binding> {
        match var.tier() {
            ScopeTier::Global => self.lineage.globals.lock().get(var.id()),
            _ => self.variable_values.last().and_then(|scope| scope.get(var.id())),
        }
    }

    pub(crate) fn binding_or_init(&mut self, var: &Variable) -> Binding {
        if let Some(binding) = self.binding(var) {
            return binding;
        }

        let graph = self.runtime.graph().clone();
        let initial = match var.initial_value(&graph) {
            Some(node) => self.evaluate(node),
            None => self.empty_list(),
        };

        // Evaluating the initial value may have bound the variable already.
        if let Some(binding) = self.binding(var) {
            self.recycle(initial);
            return binding;
        }
        match var.tier() {
            ScopeTier::Global => self.lineage.globals.lock().get_or_insert(var.id(), initial),
            _ => self.top_scope().get_or_insert(var.id(), initial),
        }
    }

    pub(crate) fn store(&mut self, var: &Variable, values: &[NodeId]) {
        match var.tier() {
            ScopeTier::Global => {
                self.lineage.globals.lock().store(var.id(), values);
            }
            _ => {
                self.top_scope().store(var.id(), values);
            }
        }
    }

    /// Drops the binding of a stored variable from the scope it lives in.
    pub fn remove_binding(&mut self, var: NodeId) -> bool {
        let Some(resolved) = self.resolve(var) else {
            return false;
        };
        let removed = match resolved.tier() {
            ScopeTier::Global => self.lineage.globals.lock().remove(var),
            ScopeTier::CallLocal => self.top_scope().remove(var),
            ScopeTier::System => {
                log::error!("Can't remove the system variable {:?}", var);
                None
            }
        };
        removed.is_some()
    }

    pub(crate) fn read_system(&mut self, var: SystemVar, consume: bool) -> NodeList {
        if var != SystemVar::ReturnValue || !consume {
            return self.peek_system(var);
        }
        match self.last_return_values.pop() {
            Some(values) => values,
            None => {
                log::error!("ReturnValue read without a preceding call");
                self.empty_list()
            }
        }
    }

    pub(crate) fn peek_system(&self, var: SystemVar) -> NodeList {
        match var {
            SystemVar::CurrentFrom => self.single(self.neuron_to_solve),
            SystemVar::CurrentTo => self.single(self.current_to),
            SystemVar::CurrentMeaning => self.single(self.current_meaning),
            SystemVar::CurrentSin => self.single(self.current_sin),
            SystemVar::CurrentInfo => {
                let mut list = self.empty_list();
                list.extend_from_slice(&self.current_info);
                list
            }
            SystemVar::ReturnValue => self.last_return_values.last().cloned().unwrap_or_default(),
        }
    }

    pub(crate) fn current_time_value(&mut self) -> NodeList {
        let now = chrono::Local::now().naive_local();
        let time = self.runtime.time();
        let mut list = self.empty_list();
        let freezer: &mut dyn Freezer = self;
        if let Some(cluster) = time.build_time_cluster(now, Some(freezer)) {
            list.push(cluster);
        }
        list
    }

    /// Ends this evaluation and returns its buffers to the pool. Frozen time
    /// clusters are reclaimed once every processor split from the same root
    /// has finished.
    pub fn finish(self) {
        drop(self);
    }

    // Fork

    /// Creates `count` sibling processors. Call-local bindings are copied,
    /// duplicated or emptied per variable; globals stay shared.
    pub fn split(&self, count: usize) -> Vec<Processor> {
        (0..count).map(|_| self.fork()).collect()
    }

    fn fork(&self) -> Processor {
        let graph = self.runtime.graph();
        let variable_values = self
            .variable_values
            .iter()
            .map(|scope| {
                let mut copy = VarScope::new();
                for (&id, binding) in scope.iter() {
                    let reaction = self
                        .runtime
                        .variable(id)
                        .map_or(SplitReaction::Copy, |var| var.split_reaction(graph));
                    let mut list = self.empty_list();
                    match reaction {
                        SplitReaction::Copy => list.extend_from_slice(&binding.read()),
                        SplitReaction::Duplicate => {
                            // Snapshot first, duplicating takes the graph write lock.
                            let mut source = self.runtime.pools().node_ids.scoped();
                            source.extend_from_slice(&binding.read());
                            list.extend(source.iter().map(|n| graph.duplicate(*n).unwrap_or(*n)));
                        }
                        SplitReaction::Empty => {}
                    }
                    copy.insert(id, Arc::new(RwLock::new(list)));
                }
                copy
            })
            .collect();

        Processor {
            runtime: self.runtime.clone(),
            lineage: self.lineage.clone(),
            stack: self.stack.clone(),
            variable_values,
            last_return_values: self.last_return_values.clone(),
            neuron_to_solve: self.neuron_to_solve,
            current_to: self.current_to,
            current_meaning: self.current_meaning,
            current_sin: self.current_sin,
            current_info: self.current_info.clone(),
            eval_depth: 0,
        }
    }
}

impl Freezer for Processor {
    fn freeze(&mut self, node: NodeId) {
        if self.runtime.graph().set_frozen(node, true) {
            self.lineage.frozen.lock().push(node);
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        let pool = &self.runtime.pools().node_ids;
        for mut scope in self.variable_values.drain(..) {
            scope.drain_lists().for_each(|list| pool.recycle(list));
        }
        for frame in self.stack.drain(..) {
            pool.recycle(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, VarTag};

    fn var(runtime: &Runtime, tag: VarTag) -> NodeId {
        runtime.graph().add_node(NodeKind::Variable(tag))
    }

    #[test]
    fn test_argument_frames() {
        let mut proc = Processor::new(Runtime::in_memory());
        proc.push_value(NodeId(100));
        proc.push_frame();
        proc.push_values(&[NodeId(101), NodeId(102)]);
        assert_eq!(proc.peek(), &[NodeId(101), NodeId(102)]);

        assert_eq!(proc.pop_frame(), vec![NodeId(101), NodeId(102)]);
        assert_eq!(proc.peek(), &[NodeId(100)]);
        assert!(proc.pop_frame().is_empty());
        assert_eq!(proc.stack_depth(), 1);
    }

    #[test]
    fn test_local_binding_released_on_exit() {
        let runtime = Runtime::in_memory();
        let local = var(&runtime, VarTag::Local);
        let mut proc = Processor::new(runtime);

        proc.enter_call();
        proc.store_value(local, &[NodeId(7)]);
        assert_eq!(proc.get_value_without_init(local), vec![NodeId(7)]);
        assert!(proc.exit_call());
        assert!(proc.get_value_without_init(local).is_empty());
        assert!(!proc.exit_call());
    }

    #[test]
    fn test_get_value_pushes_on_stack() {
        let runtime = Runtime::in_memory();
        let v = var(&runtime, VarTag::Variable);
        let mut proc = Processor::new(runtime);
        proc.store_value(v, &[NodeId(3), NodeId(4)]);

        proc.push_frame();
        proc.get_value(v);
        assert_eq!(proc.peek(), &[NodeId(3), NodeId(4)]);
    }

    #[test]
    fn test_binding_identity_is_stable() {
        let runtime = Runtime::in_memory();
        let id = var(&runtime, VarTag::Global);
        let resolved = runtime.variable(id).unwrap();
        let variable = resolved.variable().unwrap();
        let mut proc = Processor::new(runtime.clone());

        let first = proc.binding_or_init(variable);
        let second = proc.binding_or_init(variable);
        assert!(Arc::ptr_eq(&first, &second));

        proc.store(variable, &[NodeId(9)]);
        assert_eq!(*first.read(), vec![NodeId(9)]);
        let sibling = proc.split(1).pop().unwrap();
        assert!(Arc::ptr_eq(&first, &sibling.binding(variable).unwrap()));
    }

    #[test]
    fn test_initial_value_chain_and_cycle() {
        let runtime = Runtime::in_memory();
        let first = var(&runtime, VarTag::Variable);
        let second = var(&runtime, VarTag::Variable);
        let value = runtime.graph().create_constant_int(11);
        runtime.add_link(first, second, predefined::INITIAL_VALUE).unwrap();
        runtime.add_link(second, value, predefined::INITIAL_VALUE).unwrap();

        let looped = var(&runtime, VarTag::Variable);
        runtime.add_link(looped, looped, predefined::INITIAL_VALUE).unwrap();

        let mut proc = Processor::new(runtime);
        assert_eq!(proc.extract_value(first), vec![value]);
        assert_eq!(proc.get_value_without_init(second), vec![value]);
        assert!(proc.extract_value(looped).is_empty());
    }

    #[test]
    fn test_extract_scalar_uses_value_kind() {
        let runtime = Runtime::in_memory();
        let graph = runtime.graph().clone();
        let int_var = var(&runtime, VarTag::Variable);
        let bool_var = var(&runtime, VarTag::Variable);
        let untyped = var(&runtime, VarTag::Variable);
        runtime.add_link(int_var, predefined::INT_TYPE, predefined::TYPE_OF_VALUE).unwrap();
        runtime.add_link(bool_var, predefined::BOOL_TYPE, predefined::TYPE_OF_VALUE).unwrap();

        let mut proc = Processor::new(runtime);
        assert_eq!(proc.extract_scalar(int_var), Scalar::Int(0));
        proc.store_value(int_var, &[graph.create_constant_int(-5)]);
        assert_eq!(proc.extract_scalar(int_var), Scalar::Int(-5));

        proc.store_value(bool_var, &[predefined::TRUE]);
        assert_eq!(proc.extract_scalar(bool_var), Scalar::Bool(true));
        assert_eq!(proc.extract_scalar(untyped), Scalar::None);
    }

    #[test]
    fn test_non_variable_reads_are_empty() {
        let runtime = Runtime::in_memory();
        let neuron = runtime.graph().add_node(NodeKind::Neuron);
        let mut proc = Processor::new(runtime);

        assert!(proc.extract_value(neuron).is_empty());
        proc.store_value(neuron, &[NodeId(1)]);
        assert!(!proc.remove_binding(neuron));
        assert_eq!(proc.evaluate(neuron), vec![neuron]);
    }

    #[test]
    fn test_time_variable_builds_frozen_cluster() {
        let runtime = Runtime::in_memory();
        let mut proc = Processor::new(runtime.clone());

        let value = proc.extract_value(predefined::NOW);
        assert_eq!(value.len(), 1);
        let cluster = value[0];
        assert!(runtime.graph().is_frozen(cluster));
        assert!(runtime.time().parse_time_cluster(cluster).is_some());

        drop(proc);
        assert!(!runtime.graph().contains(cluster));
    }
}
