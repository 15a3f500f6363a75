use std::sync::{Arc, Mutex};

/// One observation made by a recorded task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started(usize),
    Finished(usize),
}

/// Shared log that task closures append to, so tests can check how often
/// and in which order tasks ran.
///
/// Tasks are identified by a caller-chosen tag rather than their `TaskId`,
/// since the work closure is built before the id exists.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Work that records its start and finish and succeeds.
    pub fn work(&self, tag: usize) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
        let recorder = self.clone();
        move || -> anyhow::Result<()> {
            recorder.push(Event::Started(tag));
            recorder.push(Event::Finished(tag));
            Ok(())
        }
    }

    /// Work that records its start and then fails.
    pub fn failing_work(&self, tag: usize) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
        let recorder = self.clone();
        move || -> anyhow::Result<()> {
            recorder.push(Event::Started(tag));
            anyhow::bail!("task {tag} failed on purpose")
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// How many times the task tagged `tag` started.
    pub fn run_count(&self, tag: usize) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Started(tag))
            .count()
    }

    pub fn ran(&self, tag: usize) -> bool {
        self.run_count(tag) > 0
    }

    /// Whether `dep` finished before `task` started. `false` if either
    /// event is missing.
    pub fn finished_before_started(&self, dep: usize, task: usize) -> bool {
        let events = self.events();
        let finished = events.iter().position(|e| *e == Event::Finished(dep));
        let started = events.iter().position(|e| *e == Event::Started(task));
        matches!((finished, started), (Some(f), Some(s)) if f < s)
    }

    /// Tags in the order they started.
    pub fn start_order(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::Started(tag) => Some(*tag),
                Event::Finished(_) => None,
            })
            .collect()
    }
}
