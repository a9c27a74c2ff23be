//! End-to-end routing behaviour through the public Router API.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rstest::rstest;
use switchboard_core::app::{AgentSpec, PlanSpec, QueueSpec, RouteSpec, TaskSpec};
use switchboard_core::domain::{
    AgentId, AgentState, AttributeGroup, DomainEvent, ErrorKind, PlanId, QueueId, TaskId,
    TaskState,
};
use switchboard_core::impls::RecordingEventSink;
use switchboard_core::ports::FixedClock;
use switchboard_core::{Router, RouterBuilder, RouterError};

struct Desk {
    router: Router,
    clock: Arc<FixedClock>,
    events: RecordingEventSink,
}

impl Desk {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let events = RecordingEventSink::new();
        let app = RouterBuilder::new("desk")
            .clock(clock.clone())
            .event_sink(events.clone())
            .build()
            .unwrap();
        Self {
            router: app.router,
            clock,
            events,
        }
    }

    fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    async fn queue(&self, id: &str, predicate: &str) -> QueueId {
        self.router
            .put_queue(QueueId::new(id), QueueSpec::new(predicate))
            .await
            .unwrap()
            .id
    }

    async fn agent(&self, id: &str, capabilities: AttributeGroup) -> AgentId {
        self.router
            .put_agent(AgentId::new(id), AgentSpec::new(capabilities))
            .await
            .unwrap()
            .id
    }

    async fn task(&self, id: &str, spec: TaskSpec) -> TaskId {
        self.tick();
        self.router.put_task(TaskId::new(id), spec).await.unwrap().id
    }

    async fn ready(&self, id: &AgentId) -> AgentState {
        self.tick();
        self.router
            .set_agent_state(id, AgentState::Ready)
            .await
            .unwrap()
            .state
    }

    async fn task_state(&self, id: &TaskId) -> (TaskState, Option<AgentId>) {
        let task = self.router.get_task(id).await.unwrap();
        (task.state, task.agent_id)
    }

    async fn agent_state(&self, id: &AgentId) -> AgentState {
        self.router.get_agent(id).await.unwrap().state
    }

    async fn complete(&self, id: &TaskId) {
        self.router
            .set_task_state(id, TaskState::Completed)
            .await
            .unwrap();
    }

    async fn assert_consistent(&self) {
        let violations = self.router.audit().await;
        assert!(violations.is_empty(), "{violations:#?}");
    }
}

fn english() -> AttributeGroup {
    AttributeGroup::new().with("language", "en")
}

#[tokio::test]
async fn offline_agent_picks_up_waiting_task_when_ready() {
    let desk = Desk::new();
    let queue = desk.queue("sales-en", "1==1").await;
    let agent = desk.agent("alice", english()).await;
    assert_eq!(desk.agent_state(&agent).await, AgentState::Offline);

    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;
    assert_eq!(desk.task_state(&task).await.0, TaskState::Waiting);
    assert_eq!(desk.router.queue_size(&queue).await.unwrap(), 1);

    assert_eq!(desk.ready(&agent).await, AgentState::Busy);
    assert_eq!(
        desk.task_state(&task).await,
        (TaskState::Assigned, Some(agent.clone()))
    );
    assert_eq!(desk.router.queue_size(&queue).await.unwrap(), 0);

    desk.complete(&task).await;
    assert_eq!(desk.agent_state(&agent).await, AgentState::Ready);
    assert_eq!(desk.task_state(&task).await, (TaskState::Completed, None));
    desk.assert_consistent().await;
}

#[tokio::test]
async fn highest_priority_is_served_first_across_queues() {
    let desk = Desk::new();
    for queue in ["low", "mid", "high"] {
        desk.queue(queue, "true").await;
    }
    desk.router
        .put_plan(
            PlanId::new("triage"),
            PlanSpec {
                description: None,
                routes: vec![
                    RouteSpec::new("high", 5).when("severity==critical"),
                    RouteSpec::new("mid", 3).when("severity==major"),
                ],
                default_route: Some(RouteSpec::new("low", 0)),
            },
        )
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for (id, severity) in [("t0", "minor"), ("t3", "major"), ("t5", "critical")] {
        let spec = TaskSpec::to_plan("triage")
            .with_attributes(AttributeGroup::new().with("severity", severity));
        tasks.push(desk.task(id, spec).await);
    }
    let agent = desk.agent("alice", AttributeGroup::new()).await;
    desk.ready(&agent).await;

    for expected in ["t5", "t3", "t0"] {
        let view = desk.router.get_agent(&agent).await.unwrap();
        assert_eq!(view.task_id, Some(TaskId::new(expected)));
        desk.complete(&TaskId::new(expected)).await;
    }
    assert_eq!(desk.agent_state(&agent).await, AgentState::Ready);
    desk.assert_consistent().await;
}

#[tokio::test]
async fn equal_priority_is_served_in_creation_order() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    for id in ["first", "second", "third"] {
        desk.task(id, TaskSpec::to_queue(queue.clone())).await;
    }

    let waiting: Vec<_> = desk
        .router
        .queue_tasks(&queue)
        .await
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(
        waiting,
        ["first", "second", "third"].map(TaskId::new).to_vec()
    );

    let agent = desk.agent("alice", AttributeGroup::new()).await;
    desk.ready(&agent).await;
    for expected in ["first", "second", "third"] {
        let (state, holder) = desk.task_state(&TaskId::new(expected)).await;
        assert_eq!(state, TaskState::Assigned);
        assert_eq!(holder, Some(agent.clone()));
        desk.complete(&TaskId::new(expected)).await;
    }
}

#[rstest]
#[case::exact_match("language==en", english(), true)]
#[case::missing_attribute("language==en", AttributeGroup::new(), false)]
#[case::other_language("language==en", AttributeGroup::new().with("language", "de"), false)]
#[case::list_membership(
    "language==en",
    AttributeGroup::new().with("language", vec!["fr".to_string(), "en".to_string()]),
    true
)]
#[case::skill_level("level=ge=3", AttributeGroup::new().with("level", 4_i64), true)]
#[case::skill_level_too_low("level=ge=3", AttributeGroup::new().with("level", 2_i64), false)]
#[tokio::test]
async fn assignment_respects_requirements(
    #[case] requirements: &str,
    #[case] capabilities: AttributeGroup,
    #[case] assigned: bool,
) {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let agent = desk.agent("alice", capabilities).await;
    desk.ready(&agent).await;

    let task = desk
        .task("t1", TaskSpec::to_queue(queue).requiring(requirements))
        .await;

    let (state, holder) = desk.task_state(&task).await;
    if assigned {
        assert_eq!((state, holder), (TaskState::Assigned, Some(agent)));
    } else {
        assert_eq!((state, holder), (TaskState::Waiting, None));
        assert_eq!(desk.agent_state(&agent).await, AgentState::Ready);
    }
    desk.assert_consistent().await;
}

#[tokio::test]
async fn cancelled_task_moves_to_the_next_ready_agent() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let first = desk.agent("alice", english()).await;
    desk.ready(&first).await;
    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;
    assert_eq!(
        desk.task_state(&task).await,
        (TaskState::Assigned, Some(first.clone()))
    );

    let second = desk.agent("bob", english()).await;
    desk.ready(&second).await;

    let view = desk
        .router
        .set_task_state(&task, TaskState::Waiting)
        .await
        .unwrap();
    assert_eq!(view.state, TaskState::Assigned);
    assert_eq!(view.agent_id, Some(second.clone()));
    assert_eq!(desk.agent_state(&first).await, AgentState::Unavailable);
    assert_eq!(desk.agent_state(&second).await, AgentState::Busy);
    desk.assert_consistent().await;
}

#[tokio::test]
async fn cancelled_task_waits_when_nobody_is_ready() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let agent = desk.agent("alice", english()).await;
    desk.ready(&agent).await;
    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;

    desk.router
        .set_task_state(&task, TaskState::Waiting)
        .await
        .unwrap();
    assert_eq!(desk.task_state(&task).await, (TaskState::Waiting, None));
    assert_eq!(desk.router.queue_size(&queue).await.unwrap(), 1);

    // unavailable -> ready picks the task straight back up
    assert_eq!(desk.ready(&agent).await, AgentState::Busy);
    desk.assert_consistent().await;
}

#[tokio::test]
async fn completion_reassigns_before_returning() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let agent = desk.agent("alice", english()).await;
    desk.ready(&agent).await;
    let first = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;
    let second = desk.task("t2", TaskSpec::to_queue(queue.clone())).await;
    assert_eq!(desk.task_state(&second).await.0, TaskState::Waiting);

    desk.complete(&first).await;
    assert_eq!(desk.agent_state(&agent).await, AgentState::Busy);
    assert_eq!(
        desk.task_state(&second).await,
        (TaskState::Assigned, Some(agent))
    );
}

#[tokio::test]
async fn agent_ready_longest_wins_a_contested_task() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    // ids sort opposite to ready order
    let early = desk.agent("zed", english()).await;
    let late = desk.agent("amy", english()).await;
    desk.ready(&early).await;
    desk.ready(&late).await;

    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;
    assert_eq!(desk.task_state(&task).await.1, Some(early.clone()));

    // zed goes back to the end of the line after completing
    desk.complete(&task).await;
    let next = desk.task("t2", TaskSpec::to_queue(queue)).await;
    assert_eq!(desk.task_state(&next).await.1, Some(late));
}

#[tokio::test]
async fn repeated_ready_keeps_place_in_line() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let early = desk.agent("a1", english()).await;
    let late = desk.agent("a2", english()).await;
    desk.ready(&early).await;
    desk.ready(&late).await;
    desk.ready(&early).await;

    let task = desk.task("t1", TaskSpec::to_queue(queue)).await;
    assert_eq!(desk.task_state(&task).await.1, Some(early));
}

#[tokio::test]
async fn capability_change_triggers_matching() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let agent = desk.agent("alice", AttributeGroup::new()).await;
    desk.ready(&agent).await;
    let task = desk
        .task("t1", TaskSpec::to_queue(queue).requiring("language==en"))
        .await;
    assert_eq!(desk.task_state(&task).await.0, TaskState::Waiting);

    let view = desk
        .router
        .put_agent(agent.clone(), AgentSpec::new(english()))
        .await
        .unwrap();
    assert_eq!(view.state, AgentState::Busy);
    assert_eq!(view.task_id, Some(task));
}

#[tokio::test]
async fn plan_routes_by_first_matching_route() {
    let desk = Desk::new();
    desk.queue("vip", "tier==gold").await;
    desk.queue("english", "language==en").await;
    desk.queue("general", "true").await;
    desk.router
        .put_plan(
            PlanId::new("support"),
            PlanSpec {
                description: Some("front door".into()),
                routes: vec![
                    RouteSpec::new("vip", 5).when("tier==gold"),
                    RouteSpec::new("english", 3).when("language==en"),
                ],
                default_route: Some(RouteSpec::new("general", 0)),
            },
        )
        .await
        .unwrap();

    let cases = [
        ("gold-en", english().with("tier", "gold"), "vip", 5),
        ("en", english(), "english", 3),
        ("de", AttributeGroup::new().with("language", "de"), "general", 0),
    ];
    for (id, attributes, queue, priority) in cases {
        let task = desk
            .task(id, TaskSpec::to_plan("support").with_attributes(attributes))
            .await;
        let view = desk.router.get_task(&task).await.unwrap();
        assert_eq!(view.queue_id, QueueId::new(queue), "{id}");
        assert_eq!(view.priority, priority, "{id}");
        assert_eq!(view.plan_id, Some(PlanId::new("support")));
    }
}

#[tokio::test]
async fn route_to_missing_queue_is_rejected() {
    let desk = Desk::new();
    let result = desk
        .router
        .put_plan(
            PlanId::new("broken"),
            PlanSpec {
                default_route: Some(RouteSpec::new("nowhere", 0)),
                ..PlanSpec::default()
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(RouterError::RouteResolution { ref queue_id, .. }) if queue_id == "nowhere"
    ));

    // a queue removed after the plan was defined
    desk.queue("temp", "true").await;
    desk.router
        .put_plan(
            PlanId::new("p"),
            PlanSpec {
                default_route: Some(RouteSpec::new("temp", 0)),
                ..PlanSpec::default()
            },
        )
        .await
        .unwrap();
    desk.router.delete_queue(&QueueId::new("temp")).await.unwrap();

    let err = desk
        .router
        .create_task(TaskSpec::to_plan("p"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::RouteResolution { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn created_task_reports_queue_depth() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let created = desk
        .router
        .create_task(TaskSpec::to_queue(queue.clone()))
        .await
        .unwrap();
    assert_eq!(created.queue_size, 1);
    assert!(created.id.as_str().starts_with("task-"));

    let agent = desk.agent("alice", english()).await;
    desk.ready(&agent).await;
    let created = desk
        .router
        .create_task(TaskSpec::to_queue(queue))
        .await
        .unwrap();
    // the new task waits behind nobody: alice is already busy with the first
    assert_eq!(created.queue_size, 1);
}

#[rstest]
#[case::delete_busy_agent("agent")]
#[case::delete_assigned_task("task")]
#[case::delete_queue_with_assigned_task("queue")]
#[tokio::test]
async fn deleting_what_an_assignment_holds_is_a_conflict(#[case] target: &str) {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let agent = desk.agent("alice", english()).await;
    desk.ready(&agent).await;
    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;

    let result = match target {
        "agent" => desk.router.delete_agent(&agent).await,
        "task" => desk.router.delete_task(&task).await,
        _ => desk.router.delete_queue(&queue).await,
    };
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Conflict);
    desk.assert_consistent().await;
}

#[tokio::test]
async fn deleting_a_non_empty_queue_is_a_conflict() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;

    let err = desk.router.delete_queue(&queue).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    desk.router.delete_task(&task).await.unwrap();
    desk.router.delete_queue(&queue).await.unwrap();
    assert_eq!(
        desk.router.get_queue(&queue).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[rstest]
#[case::offline_to_busy(AgentState::Offline, AgentState::Busy)]
#[case::offline_to_unavailable(AgentState::Offline, AgentState::Unavailable)]
#[case::ready_to_busy(AgentState::Ready, AgentState::Busy)]
#[case::ready_to_unavailable(AgentState::Ready, AgentState::Unavailable)]
#[tokio::test]
async fn illegal_agent_transitions_change_nothing(
    #[case] from: AgentState,
    #[case] to: AgentState,
) {
    let desk = Desk::new();
    let agent = desk.agent("alice", english()).await;
    if from == AgentState::Ready {
        desk.ready(&agent).await;
    }
    desk.events.take();

    let err = desk.router.set_agent_state(&agent, to).await.unwrap_err();
    assert!(matches!(err, RouterError::IllegalStateTransition { .. }));
    assert_eq!(desk.agent_state(&agent).await, from);
    assert!(desk.events.events().is_empty());
}

#[tokio::test]
async fn task_transitions_only_leave_assigned() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let task = desk.task("t1", TaskSpec::to_queue(queue)).await;

    for to in [TaskState::Completed, TaskState::Waiting, TaskState::Assigned] {
        let err = desk.router.set_task_state(&task, to).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict, "waiting -> {to}");
    }
    assert_eq!(desk.task_state(&task).await, (TaskState::Waiting, None));
}

#[tokio::test]
async fn admission_and_predicate_errors_are_validation() {
    let desk = Desk::new();
    let queue = desk.queue("english", "language==en").await;

    let rejected = desk
        .router
        .create_task(
            TaskSpec::to_queue(queue.clone())
                .with_attributes(AttributeGroup::new().with("language", "de")),
        )
        .await
        .unwrap_err();
    assert_eq!(rejected.kind(), ErrorKind::Validation);

    let malformed = desk
        .router
        .create_task(TaskSpec::to_queue(queue.clone()).requiring("language=="))
        .await
        .unwrap_err();
    assert!(matches!(malformed, RouterError::MalformedPredicate(_)));

    let missing = desk
        .router
        .put_queue(QueueId::new("bare"), QueueSpec::default())
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::Validation);

    assert_eq!(desk.router.queue_size(&queue).await.unwrap(), 0);
    assert!(desk.router.list_tasks().await.is_empty());
}

#[tokio::test]
async fn assignment_events_follow_commit_order() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let agent = desk.agent("alice", english()).await;
    desk.events.take();

    let task = desk
        .task(
            "t1",
            TaskSpec::to_queue(queue).with_callback("http://crm.local/t1"),
        )
        .await;
    desk.ready(&agent).await;

    let names: Vec<_> = desk.events.take().iter().map(DomainEvent::name).collect();
    assert_eq!(
        names,
        [
            "task_created",
            "agent_state_changed",
            "agent_state_changed",
            "task_assigned",
        ]
    );

    desk.complete(&task).await;
    let events = desk.events.take();
    assert!(matches!(
        &events[0],
        DomainEvent::TaskStateChanged { to: TaskState::Completed, callback_url: Some(url), .. }
            if url == "http://crm.local/t1"
    ));
}

#[tokio::test]
async fn user_context_is_replaced_without_rerouting() {
    let desk = Desk::new();
    let queue = desk.queue("general", "true").await;
    let task = desk.task("t1", TaskSpec::to_queue(queue.clone())).await;

    let view = desk
        .router
        .update_task_context(&task, AttributeGroup::new().with("note", "call back"))
        .await
        .unwrap();
    assert_eq!(view.user_context.len(), 1);
    assert_eq!(view.queue_id, queue);
    assert_eq!(view.state, TaskState::Waiting);
}
