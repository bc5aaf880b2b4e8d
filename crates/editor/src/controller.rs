use crate::address::AddressSync;
use crate::batch::{generate_and_create, BatchLimiter, BatchProgress};
use crate::clipboard::{ClipboardRecord, ClipboardStore};
use crate::config::EditorConfig;
use crate::edit_tracker::{EditKey, EditTracker, Gate, PendingIntent};
use crate::error::{EditorError, Result};
use crate::events::{EditorCommand, EditorEvent};
use crate::navigation::{Navigation, RuleRow, Selection, TreeNode};
use crate::reorder::{can_reorder, move_item, OptimisticEdit};
use crate::suggestions::{
    normalize_correspondences, AcceptedSuggestion, SuggestionEngine, SuggestionQuery,
    SuggestionSet,
};
use mapping_protocol::{
    CandidateKind, CopyRuleRequest, GenerateRulesRequest, MappingRule, RuleKind,
};
use mapping_service::{
    check_path_expression, check_uri_pattern, LabelField, ObjectRuleForm, PatternChange,
    RuleService, VocabularyLabelCache, ValueRuleForm,
};
use mapping_tree::{reassign_ids, Breadcrumb, RuleTree};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const EVENT_CAPACITY: usize = 256;

/// Spinner state of the container view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    /// No tree shown yet; the view is blocked.
    Blocking,
    /// A stale tree stays interactive while this fetch runs.
    Background,
}

/// Identifies one tree fetch. Results of outdated tickets are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    epoch: u64,
}

/// Owner of all editor state; the only place that mutates it.
pub struct EditorController {
    service: Arc<dyn RuleService>,
    config: EditorConfig,
    clipboard: Arc<dyn ClipboardStore>,
    labels: VocabularyLabelCache,
    suggestions: SuggestionEngine,
    limiter: BatchLimiter,
    events: broadcast::Sender<EditorEvent>,

    tree: Option<RuleTree>,
    navigation: Navigation,
    tracker: EditTracker,
    address: AddressSync,
    suggestions_open: bool,
    load_epoch: u64,
    load_state: LoadState,
    open_row_on_load: bool,
    just_pasted: Option<String>,
    banner: Option<String>,
}

impl EditorController {
    pub fn new(
        service: Arc<dyn RuleService>,
        clipboard: Arc<dyn ClipboardStore>,
        config: EditorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            labels: VocabularyLabelCache::new(service.clone(), config.label_cache_capacity),
            suggestions: SuggestionEngine::new(service.clone(), config.suggestion_candidates),
            limiter: BatchLimiter::new(config.batch_concurrency),
            navigation: Navigation::new(None, config.show_value_mappings),
            service,
            config,
            clipboard,
            events,
            tree: None,
            tracker: EditTracker::new(),
            address: AddressSync::default(),
            suggestions_open: false,
            load_epoch: 0,
            load_state: LoadState::Idle,
            open_row_on_load: false,
            just_pasted: None,
            banner: None,
        }
    }

    /// Page address to keep in sync; its `ruleId` becomes the start rule.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        if self.config.track_address {
            self.address = AddressSync::new(Some(address.into()));
            let initial = self.address.initial_rule_id();
            self.open_row_on_load = initial.is_some();
            self.navigation.set_current(initial);
        }
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    pub fn service(&self) -> &Arc<dyn RuleService> {
        &self.service
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn tree(&self) -> Option<&RuleTree> {
        self.tree.as_ref()
    }

    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn tracker(&self) -> &EditTracker {
        &self.tracker
    }

    pub fn current_rule_id(&self) -> Option<&str> {
        self.navigation.current()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.address()
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn suggestions_open(&self) -> bool {
        self.suggestions_open
    }

    pub fn suggestions(&self) -> Option<&SuggestionSet> {
        self.suggestions.current()
    }

    pub fn suggestion_engine(&self) -> &SuggestionEngine {
        &self.suggestions
    }

    pub fn batch_limiter(&self) -> &BatchLimiter {
        &self.limiter
    }

    /// Id of the rule pasted last; handed out once.
    pub fn take_just_pasted(&mut self) -> Option<String> {
        self.just_pasted.take()
    }

    pub fn panel(&self) -> Option<TreeNode> {
        self.tree.as_ref().map(|tree| self.navigation.panel(tree))
    }

    pub fn rows(&self) -> Vec<RuleRow> {
        self.tree
            .as_ref()
            .map(|tree| self.navigation.rows(tree))
            .unwrap_or_default()
    }

    /// Container in view, falling back to the root for unknown ids.
    pub fn container_id(&self) -> Option<&str> {
        self.tree
            .as_ref()
            .map(|tree| self.navigation.container(tree).rule.id())
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.tree
            .as_ref()
            .map(|tree| self.navigation.container(tree).breadcrumbs)
            .unwrap_or_default()
    }

    pub fn can_reorder(&self, id: &str) -> bool {
        can_reorder(id, &self.navigation, &self.tracker)
    }

    pub async fn label(&self, uri: &str) -> Option<String> {
        self.labels.get(uri, LabelField::Label).await
    }

    pub async fn description(&self, uri: &str) -> Option<String> {
        self.labels.get(uri, LabelField::Description).await
    }

    pub fn labels(&self) -> &VocabularyLabelCache {
        &self.labels
    }

    fn emit(&self, event: EditorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn show_banner(&mut self, message: String) {
        self.banner = Some(message.clone());
        self.emit(EditorEvent::Banner { message });
    }

    /// Consumes commands until the channel closes or `Shutdown` arrives.
    pub async fn run(mut self, mut commands: mpsc::Receiver<EditorCommand>) -> Self {
        log::info!("Editor started for {}", self.service.task());
        while let Some(command) = commands.recv().await {
            if command == EditorCommand::Shutdown {
                break;
            }
            // Errors are already reported as banners.
            let _ = self.handle(command).await;
        }
        log::info!("Editor stopped");
        self
    }

    /// Executes one command; structural failures also raise a banner.
    pub async fn handle(&mut self, command: EditorCommand) -> Result<()> {
        let result = self.dispatch(command).await;
        if let Err(err) = &result {
            match err {
                EditorError::Validation(msg) => log::debug!("Rejected: {msg}"),
                other => {
                    log::warn!("{other}");
                    self.show_banner(other.to_string());
                }
            }
        }
        result
    }

    async fn dispatch(&mut self, command: EditorCommand) -> Result<()> {
        match command {
            EditorCommand::RuleViewChange { key } => {
                self.tracker.open(key);
            }
            EditorCommand::RuleViewUnchanged { key } | EditorCommand::RuleViewClose { key } => {
                self.tracker.close(&key);
            }
            EditorCommand::DiscardAll => self.discard_all(),
            EditorCommand::Toggle { id, expanded } => self.navigation.set_expanded(id, expanded),
            EditorCommand::Navigate { id } => self.navigate(&id).await?,
            EditorCommand::SelectRow { id } => self.select_row(&id).await?,
            EditorCommand::ToggleAll { expanded } => {
                self.request(PendingIntent::ToggleAll { expanded }).await?
            }
            EditorCommand::Reload => self.request(PendingIntent::Reload).await?,
            EditorCommand::ShowSuggestions => self.show_suggestions().await?,
            EditorCommand::CloseSuggestions => self.close_suggestions(),
            EditorCommand::SwapSuggestions => {
                self.suggestions.swap().await?;
            }
            EditorCommand::RefineSuggestions { vocabularies } => {
                self.suggestions.refine(vocabularies).await?;
            }
            EditorCommand::AcceptSuggestions {
                accepted,
                uri_prefix,
            } => {
                self.accept_suggestions(&accepted, uri_prefix).await?;
            }
            EditorCommand::CreateRule { kind } => self.create_rule(kind).await?,
            EditorCommand::ConfirmDiscard => self.confirm_discard().await?,
            EditorCommand::CancelDiscard => self.tracker.cancel(),
            EditorCommand::Copy { id, kind } => self.copy(&id, kind).await?,
            EditorCommand::Clone {
                id,
                kind,
                parent_id,
            } => {
                self.clone_rule(&id, kind, parent_id).await?;
            }
            EditorCommand::Paste { cloning } => {
                self.paste(cloning).await?;
            }
            EditorCommand::Reorder { from, to } => self.reorder(from, to).await?,
            EditorCommand::Remove { id } => self.remove(&id).await?,
            EditorCommand::Shutdown => {}
        }
        Ok(())
    }

    /// Loads the start rule's tree.
    pub async fn start(&mut self) -> Result<()> {
        self.reload().await
    }

    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_epoch += 1;
        self.load_state = if self.tree.is_some() {
            LoadState::Background
        } else {
            LoadState::Blocking
        };
        LoadTicket {
            epoch: self.load_epoch,
        }
    }

    /// Installs a fetched tree unless a newer load was started meanwhile.
    /// Returns false for dropped results.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        fetched: mapping_service::Result<MappingRule>,
    ) -> Result<bool> {
        if ticket.epoch != self.load_epoch {
            log::debug!("Dropping outdated tree fetch #{}", ticket.epoch);
            return Ok(false);
        }
        self.load_state = LoadState::Idle;
        let tree = RuleTree::from_root(fetched?)?;
        let rules = tree.len();
        self.tree = Some(tree);

        if std::mem::take(&mut self.open_row_on_load) {
            let row = self
                .tree
                .as_ref()
                .and_then(|tree| self.navigation.row_to_open(tree));
            if let Some(row) = row {
                self.navigation.set_expanded(row, true);
            }
        }
        log::debug!("Loaded {rules} rules of {}", self.service.task());
        self.emit(EditorEvent::Reloaded { rules });
        Ok(true)
    }

    /// Refetches the whole tree.
    pub async fn reload(&mut self) -> Result<()> {
        let ticket = self.begin_load();
        let fetched = self.service.fetch_tree().await;
        self.finish_load(ticket, fetched).map(|_| ())
    }

    fn set_current(&mut self, id: Option<String>) {
        self.navigation.set_current(id);
        self.open_row_on_load = true;
        self.address.update(self.navigation.current());
        self.emit(EditorEvent::Navigated {
            rule_id: self.navigation.current().map(str::to_string),
        });
    }

    /// Passes `intent` through the unsaved-edit gate.
    async fn request(&mut self, intent: PendingIntent) -> Result<()> {
        match self.tracker.request(intent) {
            Gate::Proceed(intent) => self.apply(intent).await,
            Gate::Deferred => {
                if let Some(pending) = self.tracker.pending().cloned() {
                    self.emit(EditorEvent::DiscardRequested { pending });
                }
                Ok(())
            }
        }
    }

    async fn apply(&mut self, intent: PendingIntent) -> Result<()> {
        match intent {
            PendingIntent::Navigate(id) => {
                self.set_current(Some(id));
                self.reload().await
            }
            PendingIntent::ToggleAll { expanded } => {
                let ids: Vec<String> = self.rows().into_iter().map(|row| row.id).collect();
                self.navigation.set_all_expanded(ids, expanded);
                Ok(())
            }
            PendingIntent::ShowSuggestions => self.open_suggestions().await,
            PendingIntent::CreateRule(kind) => {
                self.tracker.open(EditKey::NewRule);
                self.emit(EditorEvent::CreateRuleRequested { kind });
                Ok(())
            }
            PendingIntent::Reload => self.reload().await,
        }
    }

    /// Navigates to `id`; the same id again does nothing.
    pub async fn navigate(&mut self, id: &str) -> Result<()> {
        if self.navigation.current() == Some(id) {
            return Ok(());
        }
        self.request(PendingIntent::Navigate(id.to_string())).await
    }

    pub async fn select_row(&mut self, id: &str) -> Result<()> {
        let selection = match &self.tree {
            Some(tree) => self.navigation.select(tree, id),
            None => Selection::Unknown,
        };
        match selection {
            Selection::Navigate(id) => self.navigate(&id).await,
            Selection::ExpandInPlace(id) => {
                self.navigation.set_expanded(id, true);
                Ok(())
            }
            Selection::Unknown => {
                log::debug!("Ignoring selection of unknown rule {id}");
                Ok(())
            }
        }
    }

    pub async fn toggle_all(&mut self, expanded: bool) -> Result<()> {
        self.request(PendingIntent::ToggleAll { expanded }).await
    }

    pub async fn create_rule(&mut self, kind: CandidateKind) -> Result<()> {
        self.request(PendingIntent::CreateRule(kind)).await
    }

    pub fn open_edit(&mut self, key: EditKey) {
        self.tracker.open(key);
    }

    pub fn close_edit(&mut self, key: &EditKey) {
        self.tracker.close(key);
    }

    /// Re-issues the parked intent with all edits dropped.
    pub async fn confirm_discard(&mut self) -> Result<()> {
        let Some(intent) = self.tracker.confirm() else {
            return Ok(());
        };
        self.hide_suggestions();
        self.apply(intent).await
    }

    pub fn cancel_discard(&mut self) {
        self.tracker.cancel();
    }

    /// Drops every open edit and all row expansion state.
    pub fn discard_all(&mut self) {
        self.tracker.discard_all();
        self.navigation.clear_expansion();
        self.hide_suggestions();
    }

    /// Updates `rule_id` with a merge patch, or appends `payload` to the
    /// container in view when there is no id, then reloads.
    pub async fn save_rule(&mut self, rule_id: Option<&str>, payload: &Value) -> Result<()> {
        match rule_id {
            Some(id) => {
                self.service.update_rule(id, payload).await?;
                self.tracker.close(&EditKey::rule(id));
            }
            None => {
                let parent = self
                    .container_id()
                    .unwrap_or(mapping_protocol::ROOT_RULE_ID)
                    .to_string();
                let created = self.service.append_rule(&parent, payload).await?;
                log::info!("Created rule {} in {parent}", created.id());
                self.tracker.close(&EditKey::NewRule);
            }
        }
        self.reload().await
    }

    pub async fn save_value_rule(&mut self, form: &ValueRuleForm) -> Result<()> {
        if let Some(path) = form.source_property.as_deref() {
            let check = check_path_expression(path);
            if !check.valid {
                let message = check
                    .parse_error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("Invalid path expression {path}"));
                return Err(EditorError::Validation(message));
            }
        }
        self.save_rule(form.id.as_deref(), &form.to_payload()).await
    }

    pub async fn save_object_rule(&mut self, form: &ObjectRuleForm) -> Result<()> {
        if let PatternChange::Set(pattern) = &form.pattern {
            let check = check_uri_pattern(pattern)?;
            if !check.valid {
                let message = check
                    .parse_error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("Invalid URI pattern {pattern}"));
                return Err(EditorError::Validation(message));
            }
        }
        self.save_rule(form.id.as_deref(), &form.to_payload()).await
    }

    /// Deletes `id`. Removing an object moves the view to its parent.
    pub async fn remove(&mut self, id: &str) -> Result<()> {
        let removed = self
            .tree
            .as_ref()
            .and_then(|tree| tree.node(id).map(|node| (node.kind, node.parent.clone())));
        self.service.delete_rule(id).await?;
        log::info!("Removed rule {id}");
        self.tracker.discard_all();
        if let Some((RuleKind::Object, parent)) = removed {
            self.set_current(parent);
        }
        self.reload().await
    }

    pub async fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let Some(tree) = self.tree.as_mut() else {
            return Ok(());
        };
        let parent = self
            .navigation
            .container(tree)
            .rule
            .id()
            .to_string();
        let mut order = tree.property_rule_ids(&parent).to_vec();
        let moved = order.get(from).cloned();
        if let Some(id) = moved.as_deref() {
            if !can_reorder(id, &self.navigation, &self.tracker) {
                return Err(EditorError::Validation(format!(
                    "Rule {id} cannot be moved while it is open"
                )));
            }
        }
        if !move_item(&mut order, from, to) {
            return Err(EditorError::Validation(format!(
                "Cannot move position {from} to {to} of {parent}"
            )));
        }

        let edit = OptimisticEdit::try_apply(tree, |tree| tree.reorder_children(&parent, &order))?;
        let outcome = self.service.reorder_rules(&parent, &order).await;
        match self.tree.as_mut() {
            Some(tree) => edit.settle(tree, outcome)?,
            None => outcome?,
        }
        log::debug!("Moved rule {} of {parent} from {from} to {to}", moved.unwrap_or_default());
        Ok(())
    }

    pub async fn copy(&mut self, id: &str, kind: RuleKind) -> Result<()> {
        let record = ClipboardRecord::copy(self.service.task(), id, kind);
        self.clipboard.set(&record).await?;
        self.emit(EditorEvent::Notice {
            message: format!("Rule {id} copied"),
        });
        Ok(())
    }

    /// Copies `id` next to itself inside `parent_id` (default: the container
    /// in view).
    pub async fn clone_rule(
        &mut self,
        id: &str,
        kind: RuleKind,
        parent_id: Option<String>,
    ) -> Result<String> {
        let parent = parent_id
            .or_else(|| self.container_id().map(str::to_string))
            .unwrap_or_else(|| mapping_protocol::ROOT_RULE_ID.to_string());
        let record = ClipboardRecord::clone_of(self.service.task(), id, kind, parent);
        self.clipboard.set(&record).await?;
        self.paste(true).await
    }

    /// Pastes the clipboard record, returning the id of the new rule.
    pub async fn paste(&mut self, cloning: bool) -> Result<String> {
        let record = self
            .clipboard
            .get()
            .await?
            .ok_or_else(|| EditorError::Clipboard("nothing to paste".to_string()))?;

        let (container, breadcrumbs) = match &self.tree {
            Some(tree) => {
                let lookup = self.navigation.container(tree);
                (lookup.rule.id().to_string(), lookup.breadcrumbs)
            }
            None => (mapping_protocol::ROOT_RULE_ID.to_string(), Vec::new()),
        };
        let target = match breadcrumbs.last() {
            Some(last) if record.kind.is_container() && record.cloning => last.id.clone(),
            _ => container,
        };
        let request = CopyRuleRequest {
            source_project: record.project.clone(),
            source_task: record.task.clone(),
            source_rule: record.rule_id.clone(),
            after_rule_id: record.cloning.then(|| record.rule_id.clone()),
        };

        let placeholder = self.placeholder(&record);
        let mut edit = None;
        if let (Some(tree), Some(rule)) = (self.tree.as_mut(), placeholder) {
            let after = request.after_rule_id.as_deref();
            match OptimisticEdit::try_apply(tree, |tree| tree.append_rule(&target, rule, after)) {
                Ok(applied) => edit = Some(applied),
                Err(err) => log::debug!("No local preview of the paste: {err}"),
            }
        }
        let outcome = self.service.copy_rule(&target, &request).await;
        let response = match (edit, self.tree.as_mut()) {
            (Some(edit), Some(tree)) => edit.settle(tree, outcome)?,
            _ => outcome?,
        };
        log::info!("Pasted {} as {} into {target}", record.rule_id, response.id);

        if cloning {
            self.clipboard.clear().await?;
        }
        self.emit(EditorEvent::Pasted {
            id: response.id.clone(),
            kind: record.kind,
        });

        if record.kind.is_container() {
            match self.tracker.request(PendingIntent::Navigate(response.id.clone())) {
                Gate::Proceed(PendingIntent::Navigate(id)) => self.set_current(Some(id)),
                Gate::Proceed(_) => {}
                Gate::Deferred => {
                    if let Some(pending) = self.tracker.pending().cloned() {
                        self.emit(EditorEvent::DiscardRequested { pending });
                    }
                }
            }
        } else {
            self.just_pasted = Some(response.id.clone());
        }
        self.reload().await?;
        Ok(response.id)
    }

    /// Local stand-in for a pasted rule of this task, shown until the reload.
    fn placeholder(&self, record: &ClipboardRecord) -> Option<MappingRule> {
        if record.source_task() != *self.service.task() {
            return None;
        }
        let mut rule = self.tree.as_ref()?.get(&record.rule_id)?.clone();
        let mut counter = 0;
        reassign_ids(&mut rule, &mut || {
            counter += 1;
            format!("pending-{counter}")
        });
        Some(rule)
    }

    pub async fn show_suggestions(&mut self) -> Result<()> {
        self.request(PendingIntent::ShowSuggestions).await
    }

    async fn open_suggestions(&mut self) -> Result<()> {
        let Some(tree) = self.tree.as_ref() else {
            return Err(EditorError::Validation("no rule tree loaded".to_string()));
        };
        let container = self.navigation.container(tree).rule;
        let target_class_uris = container
            .children()
            .map(|children| {
                children
                    .type_rules
                    .iter()
                    .map(|t| t.type_uri.clone())
                    .collect()
            })
            .unwrap_or_default();
        let query = SuggestionQuery::new(container.id(), target_class_uris);

        self.tracker.open(EditKey::NewRule);
        self.suggestions_open = true;
        let set = self.suggestions.load(query).await?;
        let rows = set.rows.len();
        self.emit(EditorEvent::SuggestionsShown { rows });
        Ok(())
    }

    fn hide_suggestions(&mut self) {
        if self.suggestions_open {
            self.suggestions_open = false;
            self.suggestions.close();
        }
    }

    pub fn close_suggestions(&mut self) {
        self.tracker.close(&EditKey::NewRule);
        self.hide_suggestions();
        self.emit(EditorEvent::SuggestionsClosed);
    }

    /// Generates and stores rules for the accepted rows. The panel closes
    /// and the tree reloads only when every rule was created.
    pub async fn accept_suggestions(
        &mut self,
        accepted: &[AcceptedSuggestion],
        uri_prefix: Option<String>,
    ) -> Result<Vec<MappingRule>> {
        let match_from_dataset = self
            .suggestions
            .current()
            .map(|set| set.match_from_dataset)
            .unwrap_or(true);
        let parent = self
            .suggestions
            .query()
            .map(|q| q.rule_id.clone())
            .or_else(|| self.container_id().map(str::to_string))
            .unwrap_or_else(|| mapping_protocol::ROOT_RULE_ID.to_string());
        let request = GenerateRulesRequest {
            correspondences: normalize_correspondences(accepted, match_from_dataset),
            uri_prefix: uri_prefix.filter(|p| !p.is_empty()),
        };

        let events = self.events.clone();
        let created = generate_and_create(
            self.service.clone(),
            &parent,
            &request,
            &self.limiter,
            move |progress: BatchProgress| {
                let _ = events.send(EditorEvent::SuggestionProgress(progress));
            },
        )
        .await?;

        self.close_suggestions();
        self.reload().await?;
        Ok(created)
    }
}
