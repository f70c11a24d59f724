//! Test doubles for engine tests: an in-memory "widget" cloud and a resource
//! that reconciles against it.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskgraph::{
    ChangeSet, CloudFormationTarget, Fields, Lifecycle, Ownership, Reference, RenderTarget, Resolved, Resolver,
    Resource, Task, TaskContext, TaskError, TerraformTarget,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredWidget {
    pub id: String,
    pub name: String,
    pub size: String,
    pub color: Option<String>,
    pub parent: Option<String>,
}

/// In-memory cloud recording every find and render
#[derive(Debug, Default)]
pub struct FakeCloud {
    widgets: Mutex<BTreeMap<String, StoredWidget>>,
    events: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, name: &str, size: &str, color: Option<&str>) -> String {
        let id = format!("w-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.widgets.lock().unwrap().insert(
            id.clone(),
            StoredWidget {
                id: id.clone(),
                name: name.to_string(),
                size: size.to_string(),
                color: color.map(str::to_string),
                parent: None,
            },
        );
        id
    }

    pub fn by_name(&self, name: &str) -> Option<StoredWidget> {
        self.widgets.lock().unwrap().values().find(|w| w.name == name).cloned()
    }

    pub fn by_id(&self, id: &str) -> Option<StoredWidget> {
        self.widgets.lock().unwrap().get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.widgets.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("render:"))
            .collect()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {} not recorded", event))
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn upsert(&self, id: Option<&str>, widget: &Widget, parent: Option<String>) -> String {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("w-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        let mut widgets = self.widgets.lock().unwrap();
        let entry = widgets.entry(id.clone()).or_insert_with(|| StoredWidget {
            id: id.clone(),
            name: widget.name.clone(),
            size: widget.size.clone().unwrap_or_default(),
            color: None,
            parent: None,
        });
        if widget.color.is_some() {
            entry.color = widget.color.clone();
        }
        if parent.is_some() {
            entry.parent = parent;
        }
        id
    }
}

/// Resource reconciled against [`FakeCloud`]
#[derive(Debug, Clone)]
pub struct Widget {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub ownership: Ownership,
    pub id: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub parent: Option<Reference>,
    pub fail_find: bool,
    pub panic_on_find: bool,
    pub delay: Duration,
    pub invalid: bool,
}

impl Widget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lifecycle: Lifecycle::Sync,
            ownership: Ownership::Owned,
            id: None,
            size: Some("small".to_string()),
            color: None,
            parent: None,
            fail_find: false,
            panic_on_find: false,
            delay: Duration::ZERO,
            invalid: false,
        }
    }

    pub fn size(mut self, size: &str) -> Self {
        self.size = Some(size.to_string());
        self
    }

    pub fn color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(Reference::task(parent));
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn shared(mut self, id: Option<&str>) -> Self {
        self.ownership = Ownership::Shared { id: id.map(str::to_string) };
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_find = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_find = true;
        self
    }

    pub fn delayed(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn invalid(mut self) -> Self {
        self.invalid = true;
        self
    }

    pub fn task(self) -> Arc<dyn Task<FakeCloud>> {
        Arc::new(self)
    }

    fn from_stored(&self, stored: StoredWidget) -> Self {
        Self {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            ownership: self.ownership.clone(),
            id: Some(stored.id),
            size: Some(stored.size),
            color: stored.color,
            parent: stored.parent.map(Reference::Id),
            fail_find: false,
            panic_on_find: false,
            delay: Duration::ZERO,
            invalid: false,
        }
    }
}

#[async_trait]
impl Resource<FakeCloud> for Widget {
    const KIND: &'static str = "Widget";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    fn identifier(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn references(&self) -> Vec<&Reference> {
        self.parent.iter().collect()
    }

    fn check_config(&self) -> Result<(), String> {
        if self.invalid {
            Err("size must be set".to_string())
        } else {
            Ok(())
        }
    }

    fn fields(&self, resolver: &Resolver<'_>) -> Fields {
        let mut fields = Fields::new()
            .text("size", self.size.clone())
            .text("color", self.color.clone());
        if let Some(parent) = &self.parent {
            fields = fields.reference("parent", resolver.id(parent));
        }
        fields
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["size"]
    }

    async fn find(&self, ctx: &TaskContext<'_, FakeCloud>) -> Result<Option<Self>, TaskError> {
        let cloud = ctx.cloud();
        cloud.record(format!("find:{}", self.name));
        cloud.enter();
        tokio::time::sleep(self.delay).await;
        cloud.leave();

        if self.panic_on_find {
            panic!("widget {} exploded", self.name);
        }
        if self.fail_find {
            return Err(TaskError::Lookup(format!("widget {} lookup refused", self.name)));
        }

        let stored = match &self.ownership {
            Ownership::Shared { id: Some(id) } => cloud.by_id(id),
            Ownership::Shared { id: None } => None,
            Ownership::Owned => cloud.by_name(&self.name),
        };
        Ok(stored.map(|s| self.from_stored(s)))
    }

    async fn discover(&self, ctx: &TaskContext<'_, FakeCloud>) -> Result<Option<String>, TaskError> {
        Ok(ctx.cloud().by_name(&self.name).map(|w| w.id))
    }

    async fn render(
        &self,
        target: RenderTarget<'_>,
        ctx: &TaskContext<'_, FakeCloud>,
        actual: Option<&Self>,
        _changes: &ChangeSet,
    ) -> Result<Resolved, TaskError> {
        let cloud = ctx.cloud();
        cloud.record(format!("render:{}", self.name));

        match target {
            RenderTarget::Direct => {
                let parent = match &self.parent {
                    Some(reference) => Some(ctx.resolver().require_id(reference)?),
                    None => None,
                };
                let id = cloud.upsert(actual.and_then(|a| a.id.as_deref()), self, parent);
                Ok(Resolved::with_id(id))
            }
            RenderTarget::Terraform(tf) => {
                let parent = match &self.parent {
                    Some(reference) => Some(ctx.resolver().require_link(reference)?),
                    None => None,
                };
                tf.add_resource(
                    "widget",
                    &self.name,
                    json!({ "size": self.size, "color": self.color, "parent": parent }),
                )?;
                let link = match ctx.discovered_id().or(self.ownership.shared_id()) {
                    Some(id) => json!(id),
                    None => TerraformTarget::link("widget", &self.name, "id"),
                };
                Ok(Resolved::with_link(link))
            }
            RenderTarget::CloudFormation(cf) => {
                let parent = match &self.parent {
                    Some(reference) => Some(ctx.resolver().require_link(reference)?),
                    None => None,
                };
                cf.add_resource(
                    "Test::Widget",
                    &self.name,
                    json!({ "Size": self.size, "Parent": parent }),
                )?;
                Ok(Resolved::with_link(CloudFormationTarget::reference("Test::Widget", &self.name)))
            }
        }
    }
}
