// SPDX-License-Identifier: MIT

//! Graph invoker
//!
//! Walks a compiled flow once per event. Nodes are visited in the compiled
//! order; each node drains the queues of its incoming edges, runs one task
//! per queued value (concurrently), and fans its results out to the queues
//! of its outgoing edges.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::instances::{NodeInstance, NodeInstances};
use super::results::{ActionsResults, EdgePayload};
use super::run_once::RunOnceGate;
use super::trace::{CallRecord, DebugTrace};
use crate::flow::action::{
    ActionOutput, ActionRegistry, ActionResult, ActionRunner, ConsoleEntry, ExecutionContext,
};
use crate::flow::dot::{entity, entity::read, Entity, EntityCell, ReshapeOptions};
use crate::flow::error::ActionError;
use crate::flow::graph::{CompiledGraph, EdgeDefinition, NodeDefinition};

/// Everything one walk starts from
#[derive(Debug, Clone)]
pub struct FlowInput {
    pub event: Value,
    pub profile: Entity,
    pub session: Entity,
    pub debug: bool,
}

impl FlowInput {
    pub fn new(event: Value) -> Self {
        Self {
            event,
            profile: entity(json!({})),
            session: entity(json!({})),
            debug: false,
        }
    }

    pub fn with_profile(mut self, profile: Entity) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_session(mut self, session: Entity) -> Self {
        self.session = session;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// The node that stopped a walk and why
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node_id: String,
    pub error: ActionError,
}

/// Result of one walk
#[derive(Debug)]
pub struct FlowOutcome {
    pub flow_id: String,
    pub event_id: String,
    /// Profile at the end of the walk, possibly a replacement
    pub profile: Entity,
    pub session: Entity,
    pub profile_replaced: bool,
    pub session_replaced: bool,
    pub memory: Value,
    pub metrics: Value,
    pub errors: Vec<NodeFailure>,
    pub trace: Option<DebugTrace>,
    pub console: Vec<ConsoleEntry>,
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Deep copy of the final profile document
    pub fn profile_snapshot(&self) -> Value {
        read(&self.profile).clone()
    }

    pub fn session_snapshot(&self) -> Value {
        read(&self.session).clone()
    }
}

struct Task {
    edge: Option<EdgeDefinition>,
    payload: EdgePayload,
}

struct TaskOutcome {
    in_edge: Option<String>,
    input: Value,
    start: DateTime<Utc>,
    result: Result<Vec<ActionResult>, ActionError>,
    suppressed: bool,
}

/// Executes a compiled flow. Walks for different events may run
/// concurrently; node runners and run-once windows are shared by all of
/// them.
pub struct GraphInvoker {
    graph: Arc<CompiledGraph>,
    registry: ActionRegistry,
    instances: NodeInstances,
    run_once: RunOnceGate,
}

impl GraphInvoker {
    pub fn new(graph: Arc<CompiledGraph>, registry: ActionRegistry) -> Self {
        Self {
            graph,
            registry,
            instances: NodeInstances::new(),
            run_once: RunOnceGate::new(),
        }
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Run the flow for one event. Node failures end the walk early and
    /// are reported in the outcome, not as an `Err`.
    pub async fn invoke(&self, input: FlowInput) -> FlowOutcome {
        let graph = Arc::clone(&self.graph);
        let event_id = input
            .event
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let profile = EntityCell::from_entity(input.profile.clone());
        let session = EntityCell::from_entity(input.session.clone());
        let base = ExecutionContext::new(
            graph.id(),
            &event_id,
            profile.clone(),
            session.clone(),
            entity(input.event.clone()),
        )
        .with_flow_document(json!({
            "id": graph.id(),
            "name": graph.definition().name,
        }))
        .with_debug(input.debug);

        let start_payload = input
            .event
            .get("properties")
            .cloned()
            .unwrap_or_else(|| input.event.clone());

        log::info!(
            "Invoking flow '{}' for event {} ({} nodes)",
            graph.id(),
            event_id,
            graph.order().len()
        );

        let mut results = ActionsResults::new();
        let mut trace = input
            .debug
            .then(|| DebugTrace::new(graph.id(), &event_id));
        let mut errors = Vec::new();

        for node_id in graph.order() {
            let Some(node) = graph.node(node_id) else {
                continue;
            };

            if node.block_flow || (node.debug && !input.debug) {
                log::debug!("Skipping node {}", node_id);
                continue;
            }

            let tasks = if graph.is_start(node_id) {
                vec![Task {
                    edge: None,
                    payload: EdgePayload::Value(start_payload.clone()),
                }]
            } else {
                let mut tasks = Vec::new();
                for edge in graph.incoming(node_id) {
                    if let Some(queued) = results.take(&edge.id) {
                        tasks.extend(queued.into_iter().map(|payload| Task {
                            edge: Some(edge.clone()),
                            payload,
                        }));
                    }
                }
                tasks
            };

            if tasks.is_empty() {
                log::debug!("Node {} has no live input edges", node_id);
                continue;
            }

            if node.skip {
                for task in &tasks {
                    for edge in graph.outgoing(node_id) {
                        results.push(&edge.id, task.payload.clone());
                    }
                }
                continue;
            }

            let profile_before = profile.current();
            let session_before = session.current();

            let emitted = self
                .run_node(node, tasks, &base, trace.as_mut())
                .await;

            if !profile.holds(&profile_before) {
                log::info!("Node {} replaced the profile", node_id);
            }
            if !session.holds(&session_before) {
                log::info!("Node {} replaced the session", node_id);
            }

            match emitted {
                Ok(emitted) => {
                    for result in emitted {
                        for edge in graph
                            .outgoing(node_id)
                            .iter()
                            .filter(|e| e.source.port == result.port)
                        {
                            results.push(&edge.id, result.value.clone().into());
                        }
                    }
                }
                Err(error) => {
                    base.for_node(node_id, None).error(error.to_string());
                    errors.push(NodeFailure {
                        node_id: node_id.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        let final_profile = profile.current();
        let final_session = session.current();
        let memory = read(base.memory()).clone();
        let metrics = read(base.metrics()).clone();

        FlowOutcome {
            flow_id: graph.id().to_string(),
            event_id,
            profile_replaced: !Arc::ptr_eq(&input.profile, &final_profile),
            session_replaced: !Arc::ptr_eq(&input.session, &final_session),
            profile: final_profile,
            session: final_session,
            memory,
            metrics,
            errors,
            trace,
            console: base.console().entries(),
        }
    }

    /// Close every constructed runner. The next walk constructs them anew.
    pub async fn close(&self) {
        self.instances.close().await;
    }

    async fn run_node(
        &self,
        node: &NodeDefinition,
        tasks: Vec<Task>,
        base: &ExecutionContext,
        mut trace: Option<&mut DebugTrace>,
    ) -> Result<Vec<ActionResult>, ActionError> {
        let instance = self
            .instances
            .get_or_construct(node, &self.registry)
            .await;

        let runner = match &instance {
            NodeInstance::Ready(runner) => runner.as_ref(),
            NodeInstance::Poisoned(error) => {
                if let Some(trace) = trace.as_deref_mut() {
                    let mut call = CallRecord::new(Utc::now(), None, Value::Null);
                    call.error = Some(error.to_string());
                    trace.record(node, call);
                }
                return Err(error.clone());
            }
        };

        if node.is_join() {
            return self.run_join(runner, node, tasks, base, trace).await;
        }

        let calls = tasks.iter().filter_map(|task| match &task.payload {
            EdgePayload::Value(value) => Some(self.call(
                runner,
                node,
                base,
                task.edge.as_ref().map(|e| e.id.clone()),
                value.clone(),
            )),
            EdgePayload::Void => None,
        });
        let mut outcomes = join_all(calls).await.into_iter();

        let mut emitted = Vec::new();
        for task in &tasks {
            let outcome = match task.payload {
                EdgePayload::Void => {
                    if let Some(trace) = trace.as_deref_mut() {
                        let mut call = CallRecord::new(
                            Utc::now(),
                            task.edge.as_ref().map(|e| e.id.clone()),
                            Value::Null,
                        );
                        call.void = true;
                        call.outputs = void_outputs(node);
                        trace.record(node, call);
                    }
                    emitted.extend(void_outputs(node));
                    continue;
                }
                EdgePayload::Value(_) => match outcomes.next() {
                    Some(outcome) => outcome,
                    None => continue,
                },
            };

            if let Some(trace) = trace.as_deref_mut() {
                trace.record(node, call_record(&outcome));
            }

            match outcome.result {
                Ok(results) => emitted.extend(results),
                Err(error) => {
                    let ctx = base.for_node(&node.id, outcome.in_edge.as_deref());
                    runner.on_error(&error, &ctx).await;
                    return Err(error);
                }
            }
        }

        Ok(emitted)
    }

    /// One call with every inbound value of the round, keyed by edge name
    async fn run_join(
        &self,
        runner: &dyn ActionRunner,
        node: &NodeDefinition,
        tasks: Vec<Task>,
        base: &ExecutionContext,
        trace: Option<&mut DebugTrace>,
    ) -> Result<Vec<ActionResult>, ActionError> {
        let mut aggregate = Map::new();
        let mut live = false;
        for task in &tasks {
            let key = task
                .edge
                .as_ref()
                .map(|e| e.key().to_string())
                .unwrap_or_else(|| node.id.clone());
            match &task.payload {
                EdgePayload::Value(value) => {
                    live = true;
                    aggregate.insert(key, value.clone());
                }
                EdgePayload::Void => {
                    aggregate.entry(key).or_insert(Value::Null);
                }
            }
        }

        if !live {
            if let Some(trace) = trace {
                let mut call = CallRecord::new(Utc::now(), None, Value::Object(aggregate));
                call.void = true;
                call.outputs = void_outputs(node);
                trace.record(node, call);
            }
            return Ok(void_outputs(node));
        }

        let mut outcome = self
            .call(runner, node, base, None, Value::Object(aggregate))
            .await;

        let ctx = base.for_node(&node.id, None);
        let reshaped = match &mut outcome.result {
            Ok(results) => reshape_results(node, results, &ctx),
            Err(_) => Ok(()),
        };
        if let Err(e) = reshaped {
            outcome.result = Err(e);
        }

        if let Some(trace) = trace {
            trace.record(node, call_record(&outcome));
        }

        match outcome.result {
            Ok(results) => Ok(results),
            Err(error) => {
                runner.on_error(&error, &ctx).await;
                Err(error)
            }
        }
    }

    async fn call(
        &self,
        runner: &dyn ActionRunner,
        node: &NodeDefinition,
        base: &ExecutionContext,
        in_edge: Option<String>,
        payload: Value,
    ) -> TaskOutcome {
        let ctx = base.for_node(&node.id, in_edge.as_deref());
        let start = Utc::now();

        let admitted = match &node.run_once {
            Some(settings) => self
                .run_once
                .admit(&node.id, settings, &ctx.accessor(&payload)),
            None => Ok(true),
        };

        let (result, suppressed) = match admitted {
            Ok(true) => match runner.run(payload.clone(), &ctx).await {
                Ok(output) => (finalize(node, output, &payload), false),
                Err(e) => (Err(e), false),
            },
            Ok(false) => (Ok(Vec::new()), true),
            Err(e) => (Err(e), false),
        };

        TaskOutcome {
            in_edge,
            input: payload,
            start,
            result,
            suppressed,
        }
    }
}

/// Apply the join reshape template of each port to its emitted value
fn reshape_results(
    node: &NodeDefinition,
    results: &mut [ActionResult],
    ctx: &ExecutionContext,
) -> Result<(), ActionError> {
    let Some(join) = &node.join else {
        return Ok(());
    };
    for result in results.iter_mut() {
        if let (Some(template), Some(value)) = (join.reshape.get(&result.port), &result.value) {
            let reshaped = ctx
                .accessor(value)
                .reshape(template, &ReshapeOptions::default())?;
            result.value = Some(reshaped);
        }
    }
    Ok(())
}

fn void_outputs(node: &NodeDefinition) -> Vec<ActionResult> {
    node.outputs.iter().map(|p| ActionResult::void(p)).collect()
}

/// Check the runner output against the node's ports and apply
/// `append_input_payload`
fn finalize(
    node: &NodeDefinition,
    output: ActionOutput,
    input: &Value,
) -> Result<Vec<ActionResult>, ActionError> {
    if matches!(&output, ActionOutput::Many(results) if results.is_empty()) {
        return Err(ActionError::InvalidOutput {
            node_id: node.id.clone(),
            message: "empty result list".to_string(),
        });
    }

    let mut results = output.into_results();
    for result in results.iter_mut() {
        if !node.outputs.contains(&result.port) {
            return Err(ActionError::InvalidOutput {
                node_id: node.id.clone(),
                message: format!("unknown output port '{}'", result.port),
            });
        }

        if node.append_input_payload {
            if let (Some(Value::Object(output)), Value::Object(input)) = (&result.value, input) {
                let mut merged = input.clone();
                merged.extend(output.clone());
                result.value = Some(Value::Object(merged));
            }
        }
    }
    Ok(results)
}

fn call_record(outcome: &TaskOutcome) -> CallRecord {
    let mut call = CallRecord::new(outcome.start, outcome.in_edge.clone(), outcome.input.clone());
    call.suppressed = outcome.suppressed;
    match &outcome.result {
        Ok(results) => call.outputs = results.clone(),
        Err(e) => call.error = Some(e.to_string()),
    }
    call
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::action::ActionOutput;
    use crate::flow::graph::{FlowDefinition, JoinSettings, RunOnce, RunOnceKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Shared record of what the scripted runners saw
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(String, Value)>>>,
        errors: Arc<Mutex<Vec<String>>>,
        constructions: Arc<Mutex<usize>>,
    }

    impl Recorder {
        fn calls_to(&self, node_id: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id == node_id)
                .map(|(_, v)| v.clone())
                .collect()
        }
    }

    /// Behaviour driven by the node's `init`:
    /// `emit` (absent echoes, null is void), `port`, `delay_ms`, `fail`,
    /// `none`, `replace_profile`, `replace_session`
    struct Scripted {
        recorder: Recorder,
        init: Value,
    }

    #[async_trait]
    impl ActionRunner for Scripted {
        async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
            *self.recorder.constructions.lock().unwrap() += 1;
            self.init = init;
            Ok(())
        }

        async fn run(
            &self,
            payload: Value,
            ctx: &ExecutionContext,
        ) -> Result<ActionOutput, ActionError> {
            if let Some(ms) = self.init.get("delay_ms").and_then(Value::as_u64) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            self.recorder
                .calls
                .lock()
                .unwrap()
                .push((ctx.node_id.clone(), payload.clone()));

            if let Some(message) = self.init.get("fail").and_then(Value::as_str) {
                return Err(ActionError::runtime(message));
            }
            if self.init.get("none").is_some() {
                return Ok(ActionOutput::None);
            }
            if let Some(profile) = self.init.get("replace_profile") {
                ctx.replace_profile(profile.clone());
            }
            if let Some(session) = self.init.get("replace_session") {
                ctx.replace_session(session.clone());
            }

            let port = self
                .init
                .get("port")
                .and_then(Value::as_str)
                .unwrap_or("payload");
            let result = match self.init.get("emit") {
                None => ActionResult::new(port, payload),
                Some(Value::Null) => ActionResult::void(port),
                Some(value) => ActionResult::new(port, value.clone()),
            };
            Ok(result.into())
        }

        async fn on_error(&self, error: &ActionError, _ctx: &ExecutionContext) {
            self.recorder.errors.lock().unwrap().push(error.to_string());
        }
    }

    struct Broken {
        recorder: Recorder,
    }

    #[async_trait]
    impl ActionRunner for Broken {
        async fn set_up(&mut self, _init: Value) -> Result<(), ActionError> {
            *self.recorder.constructions.lock().unwrap() += 1;
            Err(ActionError::config("missing credentials"))
        }

        async fn run(
            &self,
            _payload: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ActionOutput, ActionError> {
            Ok(ActionOutput::None)
        }
    }

    async fn registry(recorder: &Recorder) -> ActionRegistry {
        let registry = ActionRegistry::new();
        let scripted = recorder.clone();
        registry
            .register("test", "scripted", move || Scripted {
                recorder: scripted.clone(),
                init: Value::Null,
            })
            .await;
        let broken = recorder.clone();
        registry
            .register("test", "broken", move || Broken {
                recorder: broken.clone(),
            })
            .await;
        registry
    }

    fn node(id: &str, init: Value) -> NodeDefinition {
        NodeDefinition::new(id, "test", "scripted").with_init(init)
    }

    async fn invoker(
        recorder: &Recorder,
        nodes: Vec<NodeDefinition>,
        edges: Vec<EdgeDefinition>,
    ) -> GraphInvoker {
        let def = FlowDefinition {
            id: "flow-1".to_string(),
            nodes,
            edges,
            ..Default::default()
        };
        let graph = CompiledGraph::compile(&def).unwrap();
        GraphInvoker::new(Arc::new(graph), registry(recorder).await)
    }

    fn event(properties: Value) -> FlowInput {
        FlowInput::new(json!({"id": "ev-1", "type": "test", "properties": properties}))
    }

    #[tokio::test]
    async fn test_linear_flow_passes_payload() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![node("start", json!({})).as_start(), node("end", json!({}))],
            vec![EdgeDefinition::new("e1", "start", "end")],
        )
        .await;

        let outcome = invoker.invoke(event(json!({"value": 1}))).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.event_id, "ev-1");
        assert_eq!(recorder.calls_to("start"), vec![json!({"value": 1})]);
        assert_eq!(recorder.calls_to("end"), vec![json!({"value": 1})]);
    }

    #[tokio::test]
    async fn test_start_node_runs_once_despite_incoming_edges() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![node("start", json!({})).as_start(), node("a", json!({}))],
            vec![
                EdgeDefinition::new("e1", "start", "a"),
                EdgeDefinition::new("e2", "a", "start"),
            ],
        )
        .await;

        let outcome = invoker.invoke(event(json!({}))).await;

        assert!(outcome.is_success());
        assert_eq!(recorder.calls_to("start").len(), 1);
        assert_eq!(recorder.calls_to("a").len(), 1);
    }

    #[tokio::test]
    async fn test_diamond_join_aggregates_by_edge_name() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("a", json!({})),
                node("b", json!({"emit": "from-b", "delay_ms": 30})),
                node("c", json!({"emit": "from-c"})),
                node("d", json!({})).with_join(JoinSettings {
                    enabled: true,
                    ..Default::default()
                }),
            ],
            vec![
                EdgeDefinition::new("e0", "start", "a"),
                EdgeDefinition::new("e1", "a", "b"),
                EdgeDefinition::new("e2", "a", "c"),
                EdgeDefinition::new("e3", "b", "d").named("left"),
                EdgeDefinition::new("e4", "c", "d"),
            ],
        )
        .await;

        let outcome = invoker.invoke(event(json!({}))).await;

        assert!(outcome.is_success());
        assert_eq!(
            recorder.calls_to("d"),
            vec![json!({"left": "from-b", "e4": "from-c"})]
        );
    }

    #[tokio::test]
    async fn test_join_reshape_applies_to_output() {
        let recorder = Recorder::default();
        let reshape = HashMap::from([(
            "payload".to_string(),
            json!({"combined": ["payload@left", "payload@right"]}),
        )]);
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("b", json!({"emit": 1})),
                node("c", json!({"emit": 2})),
                node("d", json!({})).with_join(JoinSettings {
                    enabled: true,
                    reshape,
                }),
                node("end", json!({})),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "b"),
                EdgeDefinition::new("e2", "start", "c"),
                EdgeDefinition::new("e3", "b", "d").named("left"),
                EdgeDefinition::new("e4", "c", "d").named("right"),
                EdgeDefinition::new("e5", "d", "end"),
            ],
        )
        .await;

        invoker.invoke(event(json!({}))).await;

        assert_eq!(recorder.calls_to("end"), vec![json!({"combined": [1, 2]})]);
    }

    #[tokio::test]
    async fn test_void_edge_does_not_run_target() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("b", json!({"emit": null})),
                node("d", json!({})),
                node("e", json!({})),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "b"),
                EdgeDefinition::new("e2", "b", "d"),
                EdgeDefinition::new("e3", "d", "e"),
            ],
        )
        .await;

        let outcome = invoker.invoke(event(json!({})).with_debug(true)).await;

        assert!(outcome.is_success());
        assert!(recorder.calls_to("d").is_empty());
        assert!(recorder.calls_to("e").is_empty());
        let trace = outcome.trace.unwrap();
        assert!(trace.node("d").unwrap().calls[0].void);
        assert!(trace.node("e").unwrap().calls[0].void);
    }

    #[tokio::test]
    async fn test_void_edge_into_join_is_null_key() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("b", json!({"emit": null})),
                node("c", json!({"emit": "ok"})),
                node("d", json!({})).with_join(JoinSettings {
                    enabled: true,
                    ..Default::default()
                }),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "b"),
                EdgeDefinition::new("e2", "start", "c"),
                EdgeDefinition::new("e3", "b", "d").named("left"),
                EdgeDefinition::new("e4", "c", "d").named("right"),
            ],
        )
        .await;

        invoker.invoke(event(json!({}))).await;

        assert_eq!(
            recorder.calls_to("d"),
            vec![json!({"left": null, "right": "ok"})]
        );
    }

    #[tokio::test]
    async fn test_dead_edge_into_join_is_absent() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("b", json!({"none": true})),
                node("c", json!({"emit": "ok"})),
                node("d", json!({})).with_join(JoinSettings {
                    enabled: true,
                    ..Default::default()
                }),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "b"),
                EdgeDefinition::new("e2", "start", "c"),
                EdgeDefinition::new("e3", "b", "d").named("left"),
                EdgeDefinition::new("e4", "c", "d").named("right"),
            ],
        )
        .await;

        invoker.invoke(event(json!({}))).await;

        assert_eq!(recorder.calls_to("d"), vec![json!({"right": "ok"})]);
    }

    #[tokio::test]
    async fn test_unused_port_branch_stays_dead() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("branch", json!({"port": "true"})).with_outputs(&["true", "false"]),
                node("yes", json!({})),
                node("no", json!({})),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "branch"),
                EdgeDefinition::between("e2", ("branch", "true"), "yes"),
                EdgeDefinition::between("e3", ("branch", "false"), "no"),
            ],
        )
        .await;

        let outcome = invoker.invoke(event(json!({})).with_debug(true)).await;

        assert_eq!(recorder.calls_to("yes").len(), 1);
        assert!(recorder.calls_to("no").is_empty());
        assert!(outcome.trace.unwrap().node("no").is_none());
    }

    #[tokio::test]
    async fn test_runtime_error_aborts_walk() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("bad", json!({"fail": "boom"})),
                node("after", json!({})),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "bad"),
                EdgeDefinition::new("e2", "bad", "after"),
            ],
        )
        .await;

        let outcome = invoker.invoke(event(json!({})).with_debug(true)).await;

        assert_eq!(
            outcome.errors,
            vec![NodeFailure {
                node_id: "bad".to_string(),
                error: ActionError::runtime("boom"),
            }]
        );
        assert!(recorder.calls_to("after").is_empty());
        assert_eq!(recorder.errors.lock().unwrap().as_slice(), ["boom"]);
        assert!(outcome.trace.unwrap().has_errors());
        assert!(outcome
            .console
            .iter()
            .any(|entry| entry.node_id == "bad" && entry.message == "boom"));
    }

    #[tokio::test]
    async fn test_unknown_port_is_invalid_output() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![node("start", json!({"port": "nowhere"})).as_start()],
            vec![],
        )
        .await;

        let outcome = invoker.invoke(event(json!({}))).await;

        assert!(matches!(
            outcome.errors[0].error,
            ActionError::InvalidOutput { .. }
        ));
    }

    #[tokio::test]
    async fn test_poisoned_node_fails_identically_without_retry() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                NodeDefinition::new("start", "test", "broken").as_start(),
            ],
            vec![],
        )
        .await;

        let first = invoker.invoke(event(json!({}))).await;
        let second = invoker.invoke(event(json!({}))).await;

        assert!(matches!(
            first.errors[0].error,
            ActionError::Initialization { .. }
        ));
        assert_eq!(first.errors, second.errors);
        assert_eq!(*recorder.constructions.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_action_poisons_node() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![NodeDefinition::new("start", "test", "ghost").as_start()],
            vec![],
        )
        .await;

        let outcome = invoker.invoke(event(json!({}))).await;
        assert!(matches!(
            outcome.errors[0].error,
            ActionError::Initialization { .. }
        ));
    }

    #[tokio::test]
    async fn test_profile_replacement_propagates() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({"replace_profile": {"id": "merged"}})).as_start(),
                node("end", json!({})),
            ],
            vec![EdgeDefinition::new("e1", "start", "end")],
        )
        .await;

        let profile = entity(json!({"id": "original"}));
        let outcome = invoker
            .invoke(event(json!({})).with_profile(profile.clone()))
            .await;

        assert!(outcome.profile_replaced);
        assert!(!outcome.session_replaced);
        assert!(!Arc::ptr_eq(&profile, &outcome.profile));
        assert_eq!(outcome.profile_snapshot(), json!({"id": "merged"}));
        assert_eq!(read(&profile)["id"], "original");
    }

    #[tokio::test]
    async fn test_session_replacement_propagates() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({"replace_session": {"id": "s2"}})).as_start(),
                node("end", json!({})),
            ],
            vec![EdgeDefinition::new("e1", "start", "end")],
        )
        .await;

        let session = entity(json!({"id": "s1"}));
        let outcome = invoker
            .invoke(event(json!({})).with_session(session.clone()))
            .await;

        assert!(outcome.session_replaced);
        assert!(!outcome.profile_replaced);
        assert!(!Arc::ptr_eq(&session, &outcome.session));
        assert_eq!(outcome.session_snapshot(), json!({"id": "s2"}));
        assert_eq!(read(&session)["id"], "s1");
    }

    #[tokio::test]
    async fn test_skip_node_passes_through() {
        let recorder = Recorder::default();
        let mut skipped = node("skipped", json!({"emit": "changed"}));
        skipped.skip = true;
        let invoker = invoker(
            &recorder,
            vec![node("start", json!({})).as_start(), skipped, node("end", json!({}))],
            vec![
                EdgeDefinition::new("e1", "start", "skipped"),
                EdgeDefinition::new("e2", "skipped", "end"),
            ],
        )
        .await;

        invoker.invoke(event(json!({"value": 7}))).await;

        assert!(recorder.calls_to("skipped").is_empty());
        assert_eq!(recorder.calls_to("end"), vec![json!({"value": 7})]);
    }

    #[tokio::test]
    async fn test_block_flow_and_debug_nodes() {
        let recorder = Recorder::default();
        let mut blocked = node("blocked", json!({}));
        blocked.block_flow = true;
        let mut debug_only = node("debug_only", json!({}));
        debug_only.debug = true;
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                blocked,
                debug_only,
                node("after", json!({})),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "blocked"),
                EdgeDefinition::new("e2", "start", "debug_only"),
                EdgeDefinition::new("e3", "blocked", "after"),
            ],
        )
        .await;

        invoker.invoke(event(json!({}))).await;
        assert!(recorder.calls_to("blocked").is_empty());
        assert!(recorder.calls_to("debug_only").is_empty());
        assert!(recorder.calls_to("after").is_empty());

        invoker.invoke(event(json!({})).with_debug(true)).await;
        assert_eq!(recorder.calls_to("debug_only").len(), 1);
    }

    #[tokio::test]
    async fn test_append_input_payload() {
        let recorder = Recorder::default();
        let mut appending = node("append", json!({"emit": {"b": 2, "a": 9}}));
        appending.append_input_payload = true;
        let invoker = invoker(
            &recorder,
            vec![node("start", json!({})).as_start(), appending, node("end", json!({}))],
            vec![
                EdgeDefinition::new("e1", "start", "append"),
                EdgeDefinition::new("e2", "append", "end"),
            ],
        )
        .await;

        invoker.invoke(event(json!({"a": 1, "c": 3}))).await;

        assert_eq!(recorder.calls_to("end"), vec![json!({"a": 9, "b": 2, "c": 3})]);
    }

    #[tokio::test]
    async fn test_run_once_suppresses_repeat_calls() {
        let recorder = Recorder::default();
        let mut once = node("once", json!({}));
        once.run_once = Some(RunOnce {
            kind: RunOnceKind::Value,
            expression: "payload@plan".to_string(),
            ttl: 60,
        });
        let invoker = invoker(
            &recorder,
            vec![node("start", json!({})).as_start(), once, node("end", json!({}))],
            vec![
                EdgeDefinition::new("e1", "start", "once"),
                EdgeDefinition::new("e2", "once", "end"),
            ],
        )
        .await;
        let profile = entity(json!({"id": "p1"}));

        for _ in 0..2 {
            invoker
                .invoke(event(json!({"plan": "pro"})).with_profile(profile.clone()))
                .await;
        }

        assert_eq!(recorder.calls_to("once").len(), 1);
        assert_eq!(recorder.calls_to("end").len(), 1);
    }

    #[tokio::test]
    async fn test_trace_only_when_debugging() {
        let recorder = Recorder::default();
        let invoker = invoker(&recorder, vec![node("start", json!({})).as_start()], vec![]).await;

        assert!(invoker.invoke(event(json!({}))).await.trace.is_none());

        let traced = invoker.invoke(event(json!({})).with_debug(true)).await;
        let trace = traced.trace.unwrap();
        let calls = &trace.node("start").unwrap().calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].outputs, vec![ActionResult::new("payload", json!({}))]);
    }

    #[tokio::test]
    async fn test_fan_out_copies_are_independent() {
        let recorder = Recorder::default();
        let invoker = invoker(
            &recorder,
            vec![
                node("start", json!({})).as_start(),
                node("left", json!({})),
                node("right", json!({})),
            ],
            vec![
                EdgeDefinition::new("e1", "start", "left"),
                EdgeDefinition::new("e2", "start", "right"),
            ],
        )
        .await;

        invoker.invoke(event(json!({"n": 1}))).await;

        assert_eq!(recorder.calls_to("left"), vec![json!({"n": 1})]);
        assert_eq!(recorder.calls_to("right"), vec![json!({"n": 1})]);
    }

    #[tokio::test]
    async fn test_close_releases_runners() {
        let recorder = Recorder::default();
        let invoker = invoker(&recorder, vec![node("start", json!({})).as_start()], vec![]).await;
        invoker.invoke(event(json!({}))).await;
        invoker.close().await;
        invoker.invoke(event(json!({}))).await;
        assert_eq!(*recorder.constructions.lock().unwrap(), 2);
    }
}
