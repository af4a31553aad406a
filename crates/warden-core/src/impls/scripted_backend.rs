//! ScriptedTaskBackend - 開発用のタスクバックエンド
//!
//! タスクごとに「問い合わせ n 回目に返す状態」を台本として持ちます。
//! 台本を使い切った後は最後の応答を繰り返します。
//! テストと CLI の demo で使います。

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{TaskHandle, TaskStatus};
use crate::ports::{BackendError, StatusSource, TaskSubmitter};

type Step = Result<TaskStatus, BackendError>;

#[derive(Debug)]
struct Script {
    steps: VecDeque<Step>,
    last: Step,
    polls: u32,
}

impl Script {
    fn new(steps: Vec<Step>) -> Self {
        let last = steps
            .last()
            .cloned()
            .unwrap_or(Ok(TaskStatus::Running));
        Self {
            steps: steps.into(),
            last,
            polls: 0,
        }
    }

    fn next(&mut self) -> Step {
        self.polls += 1;
        self.steps.pop_front().unwrap_or_else(|| self.last.clone())
    }
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<TaskHandle, Script>,
    /// Script installed for tasks created through `submit`.
    on_submit: Vec<Step>,
    submissions: Vec<serde_json::Value>,
}

/// In-memory backend replaying scripted statuses.
#[derive(Debug, Default)]
pub struct ScriptedTaskBackend {
    state: Mutex<State>,
}

impl ScriptedTaskBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks created via `submit` will report `statuses` in order.
    pub fn on_submit(self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.state.lock().on_submit = statuses.into_iter().map(Ok).collect();
        self
    }

    /// Register an existing task with a status script.
    pub fn script(&self, task: &str, statuses: impl IntoIterator<Item = TaskStatus>) -> TaskHandle {
        self.script_steps(task, statuses.into_iter().map(Ok).collect())
    }

    /// Like [`script`](Self::script), with failing queries in the mix.
    pub fn script_steps(&self, task: &str, steps: Vec<Step>) -> TaskHandle {
        let handle = TaskHandle::new(task);
        self.state.lock().scripts.insert(handle.clone(), Script::new(steps));
        handle
    }

    /// Status queries made for `task` so far.
    pub fn polls(&self, task: &TaskHandle) -> u32 {
        self.state.lock().scripts.get(task).map_or(0, |s| s.polls)
    }

    /// Requests accepted by `submit`, oldest first.
    pub fn submissions(&self) -> Vec<serde_json::Value> {
        self.state.lock().submissions.clone()
    }
}

#[async_trait]
impl StatusSource for ScriptedTaskBackend {
    async fn get_status(&self, task: &TaskHandle) -> Result<TaskStatus, BackendError> {
        let mut state = self.state.lock();
        let script = state
            .scripts
            .get_mut(task)
            .ok_or_else(|| BackendError::UnknownTask(task.clone()))?;
        script.next()
    }
}

#[async_trait]
impl TaskSubmitter for ScriptedTaskBackend {
    async fn submit(&self, request: &serde_json::Value) -> Result<TaskHandle, BackendError> {
        let mut state = self.state.lock();
        state.submissions.push(request.clone());
        let handle = TaskHandle::new(format!("task-{}", state.submissions.len()));
        let script = Script::new(state.on_submit.clone());
        state.scripts.insert(handle.clone(), script);
        debug!(task = %handle, "scripted task submitted");
        Ok(handle)
    }
}
