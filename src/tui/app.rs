//! Main application logic for the terminal dashboard.
//!
//! `App` owns the [`Board`] and a snapshot of tasks, users and roles. Every
//! write goes through the board, waits the configured settle delay and then
//! reloads the whole snapshot, so the screen always shows what the backend
//! holds rather than a locally patched copy.

use std::collections::BTreeSet;
use std::io;
use std::time::Duration;

use chrono::NaiveDate;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, List, ListItem, ListState, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Frame, Terminal,
};
use tokio::runtime::Runtime;

use crate::dates::{format_date, format_deadline_relative, parse_date_input, today};
use crate::error::BoardError;
use crate::evidence::{render_kind, EvidenceDraft, RenderKind};
use crate::fields::{icon_for, Level, SortKey, Status};
use crate::format::sort_tasks;
use crate::hierarchy::{level_counts, observed_role_ids, RoleSet, UserPicker};
use crate::service::{Board, RosterSource, WriteKind};
use crate::status::{filter_by_category, resolve_display_status, TaskStats};
use crate::task::{Evidence, EvidenceKind, Task, TaskDates, TaskDraft};
use crate::tui::colors::{role_color, status_color, DARK_GREEN, DARK_PURPLE, DARK_RED, GOLD};
use crate::tui::enums::{PendingAction, PickerPurpose, PickerStage, Screen};
use crate::tui::input::InputField;
use crate::tui::utils::centered_rect;
use crate::user::User;

const FORM_LABELS: [&str; 9] =
    ["Title", "Description", "Role", "Plan date", "Interim date", "Final date", "Assigner", "Assignee", "Collaborators"];
const FORM_ASSIGNER: usize = 6;
const FORM_ASSIGNEE: usize = 7;
const FORM_COLLABORATORS: usize = 8;

/// New-task form. Text fields 0..=5, person fields filled through the picker.
#[derive(Default)]
struct TaskForm {
    text: [InputField; 6],
    assigner: Option<u64>,
    assignee: Option<u64>,
    collaborators: BTreeSet<u64>,
    focus: usize,
}

impl TaskForm {
    fn for_role(role: Option<&str>) -> Self {
        let mut form = TaskForm::default();
        if let Some(role) = role {
            form.text[2] = InputField::with_value(role);
        }
        form
    }

    fn draft(&self, today: NaiveDate) -> Result<TaskDraft, BoardError> {
        let date = |idx: usize, label: &'static str| -> Result<Option<NaiveDate>, BoardError> {
            let raw = self.text[idx].value.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            parse_date_input(raw, today)
                .map(Some)
                .ok_or_else(|| BoardError::validation(label, format!("could not read date {raw:?}")))
        };
        Ok(TaskDraft {
            title: self.text[0].value.trim().to_string(),
            description: self.text[1].value.trim().to_string(),
            role_category: self.text[2].value.trim().to_string(),
            dates: TaskDates {
                plan: date(3, "plan date")?,
                interim: date(4, "interim date")?,
                final_date: date(5, "final date")?,
            },
            assigner_id: self.assigner,
            assignee_id: self.assignee,
            collaborator_ids: self.collaborators.clone(),
        })
    }
}

/// Evidence entry form: kind selector plus caption, value, sub and trend.
struct EvidenceForm {
    kind: EvidenceKind,
    fields: [InputField; 4],
    focus: usize,
}

impl EvidenceForm {
    fn new() -> Self {
        EvidenceForm { kind: EvidenceKind::Stat, fields: Default::default(), focus: 0 }
    }

    /// Focus slots in use: the kind selector, then the fields this kind has.
    fn slots(&self) -> usize {
        match self.kind {
            EvidenceKind::Stat => 5,
            EvidenceKind::Link | EvidenceKind::Image => 3,
        }
    }

    fn labels(&self) -> [&'static str; 4] {
        match self.kind {
            EvidenceKind::Stat => ["Label", "Value", "Sub text", "Trend"],
            EvidenceKind::Link | EvidenceKind::Image => ["Name", "URL", "", ""],
        }
    }

    fn cycle_kind(&mut self, forward: bool) {
        self.kind = match (self.kind, forward) {
            (EvidenceKind::Stat, true) | (EvidenceKind::Image, false) => EvidenceKind::Link,
            (EvidenceKind::Link, true) | (EvidenceKind::Stat, false) => EvidenceKind::Image,
            (EvidenceKind::Image, true) | (EvidenceKind::Link, false) => EvidenceKind::Stat,
        };
        self.focus = self.focus.min(self.slots() - 1);
    }

    fn draft(&self) -> EvidenceDraft {
        let optional = |f: &InputField| Some(f.value.trim().to_string()).filter(|v| !v.is_empty());
        EvidenceDraft {
            kind: self.kind,
            caption: self.fields[0].value.trim().to_string(),
            value: self.fields[1].value.trim().to_string(),
            sub: if self.kind == EvidenceKind::Stat { optional(&self.fields[2]) } else { None },
            trend: if self.kind == EvidenceKind::Stat { optional(&self.fields[3]) } else { None },
        }
    }
}

/// Main application state for the dashboard.
pub struct App<'r> {
    rt: &'r Runtime,
    board: Board,
    screen: Screen,
    today: NaiveDate,

    tasks: Vec<Task>,
    users: Vec<User>,
    roster_note: Option<String>,
    roles: RoleSet,

    tabs: Vec<Option<String>>,
    tab: usize,
    view: Vec<Task>,
    stats: TaskStats,
    table_state: TableState,

    detail: Option<u64>,
    evidence_state: ListState,
    response: InputField,
    evidence_form: EvidenceForm,
    task_form: TaskForm,

    picker: UserPicker,
    picker_stage: PickerStage,
    picker_purpose: PickerPurpose,
    picker_state: ListState,

    pending: Option<PendingAction>,
    help_return: Screen,
    status_message: String,
}

impl<'r> App<'r> {
    pub fn new(board: Board, rt: &'r Runtime) -> Self {
        let mut app = App {
            rt,
            board,
            screen: Screen::Board,
            today: today(),
            tasks: Vec::new(),
            users: Vec::new(),
            roster_note: None,
            roles: RoleSet::default(),
            tabs: vec![None],
            tab: 0,
            view: Vec::new(),
            stats: TaskStats::default(),
            table_state: TableState::default(),
            detail: None,
            evidence_state: ListState::default(),
            response: InputField::new(),
            evidence_form: EvidenceForm::new(),
            task_form: TaskForm::default(),
            picker: UserPicker::new(),
            picker_stage: PickerStage::Level,
            picker_purpose: PickerPurpose::Browse,
            picker_state: ListState::default(),
            pending: None,
            help_return: Screen::Board,
            status_message: String::new(),
        };
        app.reload();
        app
    }

    // ---- data ----

    /// Fetch tasks, users and roles again and rebuild the current view.
    fn reload(&mut self) {
        self.today = today();
        let roster = self.rt.block_on(self.board.roster());
        self.roster_note = match roster.source {
            RosterSource::Backend => None,
            RosterSource::Fallback { reason } => Some(reason),
        };
        self.users = roster.users;
        self.roles = match self.rt.block_on(self.board.role_set()) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(error = %e, "using roles referenced by the loaded users");
                self.board.local_role_set(&observed_role_ids(&self.users))
            }
        };
        match self.rt.block_on(self.board.list_tasks(None)) {
            Ok(tasks) => self.tasks = tasks,
            Err(e) => self.set_status_message(e.user_message()),
        }
        let current = self.tabs.get(self.tab).cloned().flatten();
        self.tabs = std::iter::once(None).chain(self.roles.visible().map(|r| Some(r.id().to_string()))).collect();
        self.tab = self.tabs.iter().position(|t| *t == current).unwrap_or(0);
        self.refresh_view();
    }

    /// Follow the calendar. Display statuses and deadline text depend on the day.
    fn roll_date(&mut self, now: NaiveDate) {
        if now != self.today {
            self.today = now;
            self.refresh_view();
        }
    }

    fn refresh_view(&mut self) {
        let selected = self.selected_task().map(|t| t.id);
        let tab = self.tabs.get(self.tab).cloned().flatten();
        self.view = filter_by_category(&self.tasks, tab.as_deref()).into_iter().cloned().collect();
        sort_tasks(&mut self.view, SortKey::Status, self.today);
        self.stats = TaskStats::collect(&self.view, self.today);
        let idx = selected.and_then(|id| self.view.iter().position(|t| t.id == id));
        self.table_state.select(match (idx, self.view.is_empty()) {
            (Some(i), _) => Some(i),
            (None, false) => Some(0),
            (None, true) => None,
        });
    }

    /// Settle, reload, and report a write's result in the status bar.
    fn after_write<T>(&mut self, result: Result<T, BoardError>, kind: WriteKind, ok: impl FnOnce(&T) -> String) -> bool {
        let success = match &result {
            Ok(v) => {
                self.set_status_message(ok(v));
                true
            }
            Err(e) => {
                self.set_status_message(e.user_message());
                false
            }
        };
        self.rt.block_on(self.board.settle(kind));
        self.reload();
        success
    }

    fn selected_task(&self) -> Option<&Task> {
        self.table_state.selected().and_then(|i| self.view.get(i))
    }

    fn detail_task(&self) -> Option<&Task> {
        self.detail.and_then(|id| self.tasks.iter().find(|t| t.id == id))
    }

    fn user_name(&self, id: Option<u64>) -> String {
        match id {
            None => "-".into(),
            Some(id) => self.users.iter().find(|u| u.id == id).map(|u| u.name.clone()).unwrap_or_else(|| format!("#{id}")),
        }
    }

    fn set_status_message(&mut self, msg: String) {
        self.status_message = msg;
    }

    fn clear_status_message(&mut self) {
        self.status_message.clear();
    }

    // ---- input ----

    fn handle_board_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => {
                if let Some(i) = self.table_state.selected() {
                    self.table_state.select(Some(i.saturating_sub(1)));
                }
            }
            KeyCode::Down => {
                if let Some(i) = self.table_state.selected() {
                    if i + 1 < self.view.len() {
                        self.table_state.select(Some(i + 1));
                    }
                }
            }
            KeyCode::Right | KeyCode::Tab => {
                self.tab = (self.tab + 1) % self.tabs.len();
                self.refresh_view();
            }
            KeyCode::Left | KeyCode::BackTab => {
                self.tab = (self.tab + self.tabs.len() - 1) % self.tabs.len();
                self.refresh_view();
            }
            KeyCode::Enter => {
                if let Some(id) = self.selected_task().map(|t| t.id) {
                    self.detail = Some(id);
                    self.evidence_state.select(None);
                    self.screen = Screen::Detail;
                }
            }
            KeyCode::Char('n') => {
                let role = self.tabs.get(self.tab).cloned().flatten();
                self.task_form = TaskForm::for_role(role.as_deref());
                self.screen = Screen::TaskForm;
            }
            KeyCode::Char('p') => self.open_picker(PickerPurpose::Browse),
            KeyCode::Char('r') => {
                self.reload();
                self.set_status_message("Reloaded".into());
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.help_return = Screen::Board;
                self.screen = Screen::Help;
            }
            _ => {}
        }
        false
    }

    fn handle_detail_input(&mut self, key: KeyCode) {
        let Some(task) = self.detail_task().cloned() else {
            self.screen = Screen::Board;
            return;
        };
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Board,
            KeyCode::Char(c @ '1'..='4') => {
                let status = match c {
                    '1' => Status::Pending,
                    '2' => Status::InProgress,
                    '3' => Status::Done,
                    _ => Status::Overdue,
                };
                let result = self.rt.block_on(self.board.update_status(task.id, status));
                self.after_write(result, WriteKind::Update, |_| format!("Task #{} set to {status}", task.id));
            }
            KeyCode::Char('r') => {
                self.response = InputField::with_value(task.assignee_response.as_deref().unwrap_or(""));
                self.screen = Screen::Response;
            }
            KeyCode::Char('a') => {
                self.evidence_form = EvidenceForm::new();
                self.screen = Screen::EvidenceForm;
            }
            KeyCode::Up => {
                let i = self.evidence_state.selected().unwrap_or(0);
                self.evidence_state.select((!task.evidence.is_empty()).then(|| i.saturating_sub(1)));
            }
            KeyCode::Down => {
                let next = self.evidence_state.selected().map_or(0, |i| i + 1);
                if next < task.evidence.len() {
                    self.evidence_state.select(Some(next));
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(item) = self.evidence_state.selected().and_then(|i| task.evidence.get(i)) {
                    self.pending = Some(PendingAction::RemoveEvidence { task: task.id, evidence: item.id().to_string() });
                    self.screen = Screen::Confirm;
                }
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.help_return = Screen::Detail;
                self.screen = Screen::Help;
            }
            _ => {}
        }
    }

    fn edit_field(field: &mut InputField, key: KeyCode) {
        match key {
            KeyCode::Char(c) => field.handle_char(c),
            KeyCode::Backspace => field.handle_backspace(),
            KeyCode::Delete => field.handle_delete(),
            KeyCode::Left => field.move_cursor_left(),
            KeyCode::Right => field.move_cursor_right(),
            _ => {}
        }
    }

    fn handle_response_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => self.screen = Screen::Detail,
            KeyCode::Enter => {
                let Some(id) = self.detail else { return };
                let text = self.response.value.trim().to_string();
                let result = self.rt.block_on(self.board.update_response(id, &text));
                if self.after_write(result, WriteKind::Update, |status| format!("Response saved; task is {status}")) {
                    self.screen = Screen::Detail;
                }
            }
            other => Self::edit_field(&mut self.response, other),
        }
    }

    fn handle_evidence_input(&mut self, key: KeyCode) {
        let form = &mut self.evidence_form;
        match key {
            KeyCode::Esc => self.screen = Screen::Detail,
            KeyCode::Tab | KeyCode::Down => form.focus = (form.focus + 1) % form.slots(),
            KeyCode::BackTab | KeyCode::Up => form.focus = (form.focus + form.slots() - 1) % form.slots(),
            KeyCode::Left if form.focus == 0 => form.cycle_kind(false),
            KeyCode::Right | KeyCode::Char(' ') if form.focus == 0 => form.cycle_kind(true),
            KeyCode::Enter => {
                let Some(id) = self.detail else { return };
                let draft = form.draft();
                let result = self.rt.block_on(self.board.add_evidence(id, draft));
                if self.after_write(result, WriteKind::Update, |item| format!("Added evidence {}", item.caption())) {
                    self.screen = Screen::Detail;
                }
            }
            other if form.focus > 0 => Self::edit_field(&mut form.fields[form.focus - 1], other),
            _ => {}
        }
    }

    fn handle_task_form_input(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        let focus = self.task_form.focus;
        match key {
            KeyCode::Esc => self.screen = Screen::Board,
            KeyCode::Tab | KeyCode::Down => self.task_form.focus = (focus + 1) % FORM_LABELS.len(),
            KeyCode::BackTab | KeyCode::Up => {
                self.task_form.focus = (focus + FORM_LABELS.len() - 1) % FORM_LABELS.len()
            }
            KeyCode::Char('s') if modifiers.contains(KeyModifiers::CONTROL) => self.submit_task_form(),
            KeyCode::Char('a') if modifiers.contains(KeyModifiers::CONTROL) => self.rewrite_description(),
            KeyCode::Enter => match focus {
                FORM_ASSIGNER => self.open_picker(PickerPurpose::Assigner),
                FORM_ASSIGNEE => self.open_picker(PickerPurpose::Assignee),
                FORM_COLLABORATORS => self.open_picker(PickerPurpose::Collaborator),
                _ => self.task_form.focus = (focus + 1) % FORM_LABELS.len(),
            },
            KeyCode::Backspace | KeyCode::Delete if focus >= FORM_ASSIGNER => match focus {
                FORM_ASSIGNER => self.task_form.assigner = None,
                FORM_ASSIGNEE => self.task_form.assignee = None,
                _ => self.task_form.collaborators.clear(),
            },
            other if focus < FORM_ASSIGNER => Self::edit_field(&mut self.task_form.text[focus], other),
            _ => {}
        }
    }

    fn rewrite_description(&mut self) {
        let raw = self.task_form.text[1].value.clone();
        self.set_status_message("Analyzing description...".into());
        match self.rt.block_on(self.board.describe_with_ai(&raw)) {
            Ok(cleaned) => {
                self.task_form.text[1] = InputField::with_value(&cleaned);
                self.set_status_message("Description rewritten".into());
            }
            Err(e) => self.set_status_message(format!("Text analysis failed ({e}); description kept")),
        }
    }

    fn submit_task_form(&mut self) {
        let draft = match self.task_form.draft(self.today) {
            Ok(d) => d,
            Err(e) => return self.set_status_message(e.user_message()),
        };
        if let Err(e) = draft.validate() {
            return self.set_status_message(e.user_message());
        }
        let result = self.rt.block_on(self.board.create_task(draft));
        if self.after_write(result, WriteKind::Create, |t| format!("Created task #{}: {}", t.id, t.title)) {
            self.screen = Screen::Board;
        }
    }

    fn open_picker(&mut self, purpose: PickerPurpose) {
        self.picker.reset();
        self.picker_stage = PickerStage::Level;
        self.picker_purpose = purpose;
        self.picker_state.select(Some(0));
        self.screen = Screen::Picker;
    }

    fn close_picker(&mut self) {
        self.screen = match self.picker_purpose {
            PickerPurpose::Browse => Screen::Board,
            _ => Screen::TaskForm,
        };
    }

    /// Rows of the current picker stage.
    fn picker_items(&self) -> Vec<String> {
        match self.picker_stage {
            PickerStage::Level => {
                let counts = level_counts(&self.users);
                Level::ALL.iter().map(|l| format!("{l}  ({})", counts.get(l).copied().unwrap_or(0))).collect()
            }
            PickerStage::Role => std::iter::once(format!("All roles at {}", self.picker.level().unwrap_or_default()))
                .chain(
                    self.picker
                        .roles_at_level(&self.users)
                        .into_iter()
                        .map(|(role, n)| format!("{}  ({n})", self.roles.display_name(&role))),
                )
                .collect(),
            PickerStage::Person => self
                .picker
                .candidates(&self.users)
                .into_iter()
                .map(|u| format!("{} {}  {}", u.badge(), u.name, self.roles.display_name(&u.role)))
                .collect(),
        }
    }

    fn handle_picker_input(&mut self, key: KeyCode) {
        let len = self.picker_items().len();
        let i = self.picker_state.selected().unwrap_or(0);
        match key {
            KeyCode::Up => self.picker_state.select(Some(i.saturating_sub(1))),
            KeyCode::Down if i + 1 < len => self.picker_state.select(Some(i + 1)),
            KeyCode::Esc => match self.picker_stage {
                PickerStage::Level => self.close_picker(),
                PickerStage::Role => {
                    self.picker.reset();
                    self.picker_stage = PickerStage::Level;
                    self.picker_state.select(Some(0));
                }
                PickerStage::Person => {
                    self.picker.clear_role();
                    self.picker_stage = PickerStage::Role;
                    self.picker_state.select(Some(0));
                }
            },
            KeyCode::Enter if len > 0 => match self.picker_stage {
                PickerStage::Level => {
                    self.picker.select_level(Level::ALL[i.min(Level::ALL.len() - 1)]);
                    self.picker_stage = PickerStage::Role;
                    self.picker_state.select(Some(0));
                }
                PickerStage::Role => {
                    if i == 0 {
                        self.picker.clear_role();
                    } else if let Some((role, _)) = self.picker.roles_at_level(&self.users).into_iter().nth(i - 1) {
                        if let Err(e) = self.picker.select_role(role) {
                            return self.set_status_message(e.user_message());
                        }
                    }
                    self.picker_stage = PickerStage::Person;
                    self.picker_state.select(Some(0));
                }
                PickerStage::Person => {
                    let Some(id) = self.picker.candidates(&self.users).get(i).map(|u| u.id) else { return };
                    match self.picker.pick(&self.users, id) {
                        Ok(user) => {
                            let name = user.name.clone();
                            match self.picker_purpose {
                                PickerPurpose::Browse => {}
                                PickerPurpose::Assignee => self.task_form.assignee = Some(id),
                                PickerPurpose::Assigner => self.task_form.assigner = Some(id),
                                PickerPurpose::Collaborator => {
                                    self.task_form.collaborators.insert(id);
                                }
                            }
                            self.set_status_message(format!("{}: {name}", self.picker_purpose.title()));
                            self.close_picker();
                        }
                        Err(e) => self.set_status_message(e.user_message()),
                    }
                }
            },
            _ => {}
        }
    }

    fn handle_confirm_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(PendingAction::RemoveEvidence { task, evidence }) = self.pending.take() {
                    let result = self.rt.block_on(self.board.remove_evidence(task, &evidence));
                    self.after_write(result, WriteKind::Update, |_| format!("Removed evidence {evidence}"));
                    self.evidence_state.select(None);
                }
                self.screen = Screen::Detail;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.pending = None;
                self.screen = Screen::Detail;
            }
            _ => {}
        }
    }

    fn handle_input(&mut self) -> io::Result<bool> {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(false);
                }
                self.clear_status_message();
                match self.screen {
                    Screen::Board => return Ok(self.handle_board_input(key.code, key.modifiers)),
                    Screen::Detail => self.handle_detail_input(key.code),
                    Screen::Response => self.handle_response_input(key.code),
                    Screen::EvidenceForm => self.handle_evidence_input(key.code),
                    Screen::TaskForm => self.handle_task_form_input(key.code, key.modifiers),
                    Screen::Picker => self.handle_picker_input(key.code),
                    Screen::Confirm => self.handle_confirm_input(key.code),
                    Screen::Help => self.screen = self.help_return,
                }
            }
        }
        Ok(false)
    }

    // ---- rendering ----

    fn render_board(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let mut header = vec![
            Span::styled("WARDBOARD", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(self.board.gateway().describe(), Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC)),
        ];
        if let Some(note) = &self.roster_note {
            header.push(Span::styled(format!("  sample roster: {note}"), Style::default().fg(Color::Yellow)));
        }
        f.render_widget(
            Paragraph::new(Line::from(header)).block(Block::default().borders(Borders::ALL)).alignment(Alignment::Center),
            chunks[0],
        );

        let titles: Vec<Line> = self
            .tabs
            .iter()
            .map(|tab| match tab {
                None => Line::from("All"),
                Some(id) => {
                    let role = self.roles.resolve(id);
                    Line::from(Span::styled(
                        format!("{} {}", icon_for(role.icon()).glyph, role.name()),
                        Style::default().fg(role_color(role.color())),
                    ))
                }
            })
            .collect();
        let tabs = Tabs::new(titles)
            .select(self.tab)
            .block(Block::default().borders(Borders::ALL).title("Roles (←/→)"))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED));
        f.render_widget(tabs, chunks[1]);

        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL))
            .gauge_style(Style::default().fg(DARK_GREEN))
            .percent(u16::from(self.stats.completion_percent()))
            .label(format!(
                "{} tasks  {} done  {} overdue  {}% complete",
                self.stats.total,
                self.stats.done,
                self.stats.overdue,
                self.stats.completion_percent()
            ));
        f.render_widget(gauge, chunks[2]);

        let header_cells = ["ID", "Status", "Due", "Role", "Assignee", "Evidence", "Title"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
        let header = Row::new(header_cells).style(Style::default().bg(GOLD).fg(Color::Rgb(20, 20, 20))).height(1);

        let rows: Vec<Row> = self
            .view
            .iter()
            .map(|task| {
                let display = resolve_display_status(task, self.today);
                Row::new(vec![
                    Cell::from(task.id.to_string()),
                    Cell::from(display.label()),
                    Cell::from(format_deadline_relative(task.dates.final_date, self.today)),
                    Cell::from(self.roles.display_name(&task.role_category)),
                    Cell::from(self.user_name(task.assignee_id)),
                    Cell::from(task.evidence.len().to_string()),
                    Cell::from(task.title.clone()),
                ])
                .style(Style::default().fg(status_color(display)))
            })
            .collect();

        let widths = [
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(8),
            Constraint::Min(20),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "Tasks ({}/{}) - Press 'h' for help",
                self.view.len(),
                self.tasks.len()
            )))
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");
        f.render_stateful_widget(table, chunks[3], &mut self.table_state);
    }

    fn evidence_item(item: &Evidence) -> ListItem<'static> {
        let kind = render_kind(item);
        let glyph = icon_for(kind.icon()).glyph;
        let text = match item {
            Evidence::Stat { label, value, sub, trend, .. } => {
                let mut s = format!("{glyph} {label}: {value}");
                if let Some(sub) = sub {
                    s.push_str(&format!("  {sub}"));
                }
                if let (Some(trend), RenderKind::Stat { trending: true }) = (trend, kind) {
                    s.push_str(&format!("  ↑ {trend}"));
                }
                s
            }
            Evidence::Link { name, url, .. } | Evidence::Image { name, url, .. } => format!("{glyph} {name}  {url}"),
        };
        ListItem::new(text)
    }

    fn render_detail(&mut self, f: &mut Frame, area: Rect) {
        let Some(task) = self.detail_task().cloned() else {
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(10), Constraint::Length((task.evidence.len() as u16).max(1) + 2)])
            .split(area);

        let display = resolve_display_status(&task, self.today);
        let collaborators: Vec<String> = task.collaborator_ids.iter().map(|id| self.user_name(Some(*id))).collect();
        let label = |s: &str| Span::styled(format!("{s:<14}"), Style::default().add_modifier(Modifier::BOLD));
        let mut lines = vec![
            Line::from(vec![label("Status"), Span::styled(display.label(), Style::default().fg(status_color(display))), Span::raw(format!("  (stored: {})", task.status))]),
            Line::from(vec![label("Role"), Span::raw(self.roles.display_name(&task.role_category))]),
            Line::from(vec![label("Assigned by"), Span::raw(self.user_name(task.assigner_id))]),
            Line::from(vec![label("Assignee"), Span::raw(self.user_name(task.assignee_id))]),
            Line::from(vec![label("Collaborators"), Span::raw(if collaborators.is_empty() { "-".into() } else { collaborators.join(", ") })]),
            Line::from(vec![
                label("Dates"),
                Span::raw(format!(
                    "plan {}  interim {}  final {} ({})",
                    format_date(task.dates.plan),
                    format_date(task.dates.interim),
                    format_date(task.dates.final_date),
                    format_deadline_relative(task.dates.final_date, self.today)
                )),
            ]),
            Line::from(""),
            Line::from(task.description.clone()),
            Line::from(""),
            Line::from(vec![label("Response"), Span::raw(task.assignee_response.clone().unwrap_or_else(|| "-".into()))]),
        ];
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "1-4 set status  r respond  a add evidence  d remove evidence  Esc back",
            Style::default().fg(Color::DarkGray),
        )));
        f.render_widget(
            Paragraph::new(lines)
                .block(Block::default().borders(Borders::ALL).title(format!("#{} {}", task.id, task.title)))
                .wrap(Wrap { trim: false }),
            chunks[0],
        );

        let items: Vec<ListItem> = if task.evidence.is_empty() {
            vec![ListItem::new("No evidence yet")]
        } else {
            task.evidence.iter().map(Self::evidence_item).collect()
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(format!("Evidence ({})", task.evidence.len())))
            .highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, chunks[1], &mut self.evidence_state);
    }

    fn render_response(&mut self, f: &mut Frame, area: Rect) {
        let area = centered_rect(70, 30, area);
        f.render_widget(Clear, area);
        let text = vec![
            Line::from(self.response.with_cursor()),
            Line::from(""),
            Line::from(Span::styled("Enter save  Esc cancel", Style::default().fg(Color::DarkGray))),
        ];
        f.render_widget(
            Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Response")).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn field_line(label: &str, value: String, focused: bool) -> Line<'static> {
        let style = if focused { Style::default().fg(Color::Black).bg(Color::Gray) } else { Style::default() };
        Line::from(vec![
            Span::styled(format!("{label:<14}"), Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(value, style),
        ])
    }

    fn render_evidence_form(&mut self, f: &mut Frame, area: Rect) {
        let area = centered_rect(60, 40, area);
        f.render_widget(Clear, area);
        let form = &self.evidence_form;
        let kind = match form.kind {
            EvidenceKind::Stat => "< statistic >",
            EvidenceKind::Link => "< link >",
            EvidenceKind::Image => "< image >",
        };
        let mut lines = vec![Self::field_line("Kind", kind.to_string(), form.focus == 0)];
        for (i, label) in form.labels().iter().enumerate().take(form.slots() - 1) {
            let field = &form.fields[i];
            let focused = form.focus == i + 1;
            let value = if focused { field.with_cursor() } else { field.value.clone() };
            lines.push(Self::field_line(label, value, focused));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Tab next  ←/→ kind  Enter save  Esc cancel", Style::default().fg(Color::DarkGray))));
        f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Add evidence")), area);
    }

    fn render_task_form(&mut self, f: &mut Frame, area: Rect) {
        let form = &self.task_form;
        let mut lines = Vec::new();
        for (i, label) in FORM_LABELS.iter().enumerate() {
            let focused = form.focus == i;
            let value = match i {
                FORM_ASSIGNER => self.user_name(form.assigner),
                FORM_ASSIGNEE => self.user_name(form.assignee),
                FORM_COLLABORATORS if form.collaborators.is_empty() => "-".into(),
                FORM_COLLABORATORS => {
                    form.collaborators.iter().map(|id| self.user_name(Some(*id))).collect::<Vec<_>>().join(", ")
                }
                _ if focused => form.text[i].with_cursor(),
                _ => form.text[i].value.clone(),
            };
            lines.push(Self::field_line(label, value, focused));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab next  Enter pick person  Ctrl+A rewrite description  Ctrl+S create  Esc cancel",
            Style::default().fg(Color::DarkGray),
        )));
        lines.push(Line::from(Span::styled(
            "Dates: YYYY-MM-DD, today, tomorrow, in 3d, next fri, end of month",
            Style::default().fg(Color::DarkGray),
        )));
        f.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("New task")).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn render_picker(&mut self, f: &mut Frame, area: Rect) {
        let area = centered_rect(60, 60, area);
        f.render_widget(Clear, area);
        let crumbs = match (self.picker.level(), self.picker.role()) {
            (None, _) => "choose a level".to_string(),
            (Some(l), None) => format!("{l}"),
            (Some(l), Some(r)) => format!("{l} / {}", self.roles.display_name(r)),
        };
        let items: Vec<ListItem> = self.picker_items().into_iter().map(ListItem::new).collect();
        let empty = items.is_empty();
        let list = List::new(if empty { vec![ListItem::new("Nobody here")] } else { items })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(DARK_PURPLE))
                    .title(format!("{}: {crumbs}  (Enter select, Esc back)", self.picker_purpose.title())),
            )
            .highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, area, &mut self.picker_state);
    }

    fn render_help(&mut self, f: &mut Frame, area: Rect) {
        let lines: Vec<Line> = [
            "Board",
            "  ←/→ Tab     switch role tab",
            "  ↑/↓         select task",
            "  Enter       open task",
            "  n           new task",
            "  p           browse people by level and role",
            "  r           reload",
            "  q Esc       quit",
            "",
            "Task",
            "  1 2 3 4     set status pending / in progress / done / overdue",
            "  r           write response (starts a pending task)",
            "  a           add evidence",
            "  ↑/↓ d       select and remove evidence",
            "",
            "Press any key to return",
        ]
        .into_iter()
        .map(Line::from)
        .collect();
        let area = centered_rect(60, 70, area);
        f.render_widget(Clear, area);
        f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help")), area);
    }

    fn render_confirm(&mut self, f: &mut Frame, area: Rect) {
        let area = centered_rect(50, 20, area);
        f.render_widget(Clear, area);
        let text = vec![
            Line::from(""),
            Line::from(Span::styled("Are you sure you want to:", Style::default().add_modifier(Modifier::BOLD))),
            Line::from(self.pending.as_ref().map(PendingAction::describe).unwrap_or_default()),
            Line::from(""),
            Line::from("Press 'y' to confirm, 'n' to cancel"),
        ];
        f.render_widget(
            Paragraph::new(text)
                .block(Block::default().title("Confirm Action").borders(Borders::ALL).style(Style::default().bg(DARK_RED)))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            area,
        );
    }

    fn render_status_bar(&mut self, f: &mut Frame, area: Rect) {
        let text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else {
            match self.screen {
                Screen::Board => format!("{} tasks | Press 'h' for help", self.view.len()),
                Screen::Detail => "Task details".into(),
                Screen::Response => "Response".into(),
                Screen::EvidenceForm => "Add evidence".into(),
                Screen::TaskForm => "New task".into(),
                Screen::Picker => self.picker_purpose.title().into(),
                Screen::Help => "Help".into(),
                Screen::Confirm => "Confirm action".into(),
            }
        };
        f.render_widget(Paragraph::new(text).style(Style::default().bg(DARK_GREEN).fg(Color::White)), area);
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(f.area());

        match self.screen {
            Screen::Board => self.render_board(f, chunks[0]),
            Screen::Detail => self.render_detail(f, chunks[0]),
            Screen::Response => {
                self.render_detail(f, chunks[0]);
                self.render_response(f, chunks[0]);
            }
            Screen::EvidenceForm => {
                self.render_detail(f, chunks[0]);
                self.render_evidence_form(f, chunks[0]);
            }
            Screen::TaskForm => self.render_task_form(f, chunks[0]),
            Screen::Picker => {
                match self.picker_purpose {
                    PickerPurpose::Browse => self.render_board(f, chunks[0]),
                    _ => self.render_task_form(f, chunks[0]),
                }
                self.render_picker(f, chunks[0]);
            }
            Screen::Help => self.render_help(f, chunks[0]),
            Screen::Confirm => {
                self.render_detail(f, chunks[0]);
                self.render_confirm(f, chunks[0]);
            }
        }
        self.render_status_bar(f, chunks[1]);
    }

    /// Main event loop: render, then handle one input event, until the user quits.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            self.roll_date(today());
            terminal.draw(|f| self.render(f))?;
            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analyzer::Unconfigured;
    use crate::config::SettleDelays;
    use crate::fields::DisplayStatus;
    use crate::gateway::local::LocalGateway;
    use crate::role_repo::RoleRepository;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn task_form_builds_a_draft_from_text() {
        let mut form = TaskForm::for_role(Some("nurse"));
        form.text[0] = InputField::with_value(" Audit rails ");
        form.text[5] = InputField::with_value("tomorrow");
        form.assignee = Some(4);
        let draft = form.draft(d(2025, 6, 10)).unwrap();
        assert_eq!(draft.title, "Audit rails");
        assert_eq!(draft.role_category, "nurse");
        assert_eq!(draft.dates.final_date, Some(d(2025, 6, 11)));
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn task_form_rejects_unreadable_dates() {
        let mut form = TaskForm::default();
        form.text[5] = InputField::with_value("someday");
        assert!(matches!(form.draft(d(2025, 6, 10)), Err(BoardError::Validation { field: "final date", .. })));
    }

    #[test]
    fn evidence_form_cycles_kinds_and_drops_stat_fields() {
        let mut form = EvidenceForm::new();
        form.fields[0] = InputField::with_value("Drive folder");
        form.fields[1] = InputField::with_value("https://example.test/f");
        form.fields[2] = InputField::with_value("left over");
        form.focus = 4;
        form.cycle_kind(true);
        assert_eq!(form.kind, EvidenceKind::Link);
        assert_eq!(form.focus, 2);
        let draft = form.draft();
        assert_eq!(draft.sub, None);
        assert!(draft.validate().is_ok());
        form.cycle_kind(true);
        form.cycle_kind(true);
        assert_eq!(form.kind, EvidenceKind::Stat);
    }

    #[test]
    fn statuses_follow_the_calendar_while_open() {
        let rt = Runtime::new().unwrap();
        let board = Board::new(
            Arc::new(LocalGateway::in_memory()),
            RoleRepository::in_memory(),
            Arc::new(Unconfigured),
            SettleDelays::NONE,
        );
        let draft = TaskDraft {
            title: "Night shift handover".into(),
            assignee_id: Some(2),
            role_category: "nurse".into(),
            dates: TaskDates { final_date: Some(d(2025, 6, 10)), ..TaskDates::default() },
            ..TaskDraft::default()
        };
        rt.block_on(board.create_task(draft)).unwrap();

        let mut app = App::new(board, &rt);
        app.roll_date(d(2025, 6, 10));
        assert_eq!(app.stats.overdue, 0);
        assert_eq!(resolve_display_status(&app.view[0], app.today), DisplayStatus::Pending);

        app.roll_date(d(2025, 6, 11));
        assert_eq!(app.today, d(2025, 6, 11));
        assert_eq!(app.stats.overdue, 1);
        assert_eq!(resolve_display_status(&app.view[0], app.today), DisplayStatus::Overdue);
    }
}
