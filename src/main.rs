mod config;
mod conversation;
mod error;
mod format;
mod lifecycle;
mod preferences;
mod thread_view;
mod webhook;

use iced::{
    alignment,
    event::{self, Event as IcedEvent},
    keyboard::{self, key::Named, Key, Modifiers},
    time,
    widget::{button, column, container, row, scrollable, text, text_editor, Column},
    window, Element, Length, Size, Subscription, Task, Theme,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use config::{Config, UiCopy};
use conversation::Role;
use lifecycle::{Completion, Controller, Mode, UiEvent};
use preferences::Preferences;
use thread_view::ThreadView;
use webhook::{Transport, WebhookClient};

const TYPING_FRAMES: [&str; 3] = ["•", "• •", "• • •"];

fn init_logging() {
    let default_level = if std::env::var("BASKET_CHAT_DEBUG").is_ok() {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("BASKET_CHAT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> iced::Result {
    init_logging();

    let config = Config::load();
    let window_settings = window::Settings {
        size: Size::new(config.window.width as f32, config.window.height as f32),
        min_size: Some(Size::new(
            config.window.min_width as f32,
            config.window.min_height as f32,
        )),
        position: window::Position::Centered,
        ..Default::default()
    };

    iced::application(App::title, App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window_settings)
        .run_with(move || App::new(config))
}

#[derive(Debug, Clone)]
enum Message {
    EditorAction(text_editor::Action),
    EnterPressed { shift: bool },
    SendPressed,
    StarterPressed(String),
    CtaPressed,
    Completed(Completion),
    ToggleTheme,
    ToggleAudience,
    Tick,
    Exit,
}

struct App {
    controller: Controller<ThreadView>,
    transport: Arc<dyn Transport>,
    config: Config,
    copy: UiCopy,
    preferences: Preferences,
    preferences_dir: PathBuf,
    typing_frame: usize,
    thread_id: scrollable::Id,
}

impl App {
    fn new(config: Config) -> (Self, Task<Message>) {
        let preferences_dir = Config::get_config_dir();
        let preferences = Preferences::load(&preferences_dir);

        let transport: Arc<dyn Transport> = Arc::new(WebhookClient::with_config(
            config.endpoints.clone(),
            Duration::from_secs(config.http.connect_timeout_secs),
        ));

        let app = App {
            controller: Controller::new(ThreadView::default(), preferences.audience),
            transport,
            copy: config.copy_for(preferences.audience),
            config,
            preferences,
            preferences_dir,
            typing_frame: 0,
            thread_id: scrollable::Id::unique(),
        };

        (app, Task::none())
    }

    fn title(&self) -> String {
        self.copy.title.clone()
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        let task = match message {
            Message::EditorAction(action) => {
                self.controller.presenter_mut().edit_input(action);
                Task::none()
            }
            Message::EnterPressed { shift } => {
                let text = self.controller.presenter().input_text();
                self.start(UiEvent::EnterPressed { text, shift })
            }
            Message::SendPressed => {
                let text = self.controller.presenter().input_text();
                self.start(UiEvent::ComposerSubmit(text))
            }
            Message::StarterPressed(prompt) => self.start(UiEvent::StarterChosen(prompt)),
            Message::CtaPressed => {
                let prompt = self.copy.cta_message.clone();
                self.start(UiEvent::CtaPressed(prompt))
            }
            Message::Completed(completion) => {
                self.controller.complete(completion);
                Task::none()
            }
            Message::ToggleTheme => {
                self.preferences.toggle_theme();
                self.save_preferences();
                Task::none()
            }
            Message::ToggleAudience => {
                let audience = self.preferences.toggle_audience();
                self.controller.set_audience(audience);
                self.copy = self.config.copy_for(audience);
                self.save_preferences();
                Task::none()
            }
            Message::Tick => {
                self.typing_frame = (self.typing_frame + 1) % TYPING_FRAMES.len();
                Task::none()
            }
            Message::Exit => return iced::exit(),
        };

        if self.controller.presenter_mut().take_scroll_request() {
            let snap = scrollable::snap_to(self.thread_id.clone(), scrollable::RelativeOffset::END);
            Task::batch([task, snap])
        } else {
            task
        }
    }

    fn start(&mut self, event: UiEvent) -> Task<Message> {
        match self.controller.dispatch(event) {
            Some(dispatch) => {
                self.typing_frame = 0;
                let transport = self.transport.clone();
                Task::perform(dispatch.run(transport), Message::Completed)
            }
            None => Task::none(),
        }
    }

    fn save_preferences(&self) {
        if let Err(e) = self.preferences.save(&self.preferences_dir) {
            warn!("Could not save preferences: {:#}", e);
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let typing = if self.controller.mode() == Mode::AwaitingReply {
            time::every(Duration::from_millis(400)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Exit)
            } else {
                None
            }
        });

        Subscription::batch([typing, events])
    }

    fn view(&self) -> Element<Message> {
        let thread_view = self.controller.presenter();
        let sending = self.controller.mode() == Mode::AwaitingReply;

        let theme_label = match self.preferences.theme {
            preferences::Theme::Light => "Dark mode",
            preferences::Theme::Dark => "Light mode",
        };
        let audience_label = match self.preferences.audience {
            preferences::Audience::Buyer => "I'm a farmer",
            preferences::Audience::Farmer => "I'm a buyer",
        };

        let header = row![
            text(self.copy.title.as_str()).size(22).width(Length::Fill),
            button(text(theme_label).size(13)).on_press(Message::ToggleTheme),
            button(text(audience_label).size(13)).on_press(Message::ToggleAudience),
        ]
        .spacing(8)
        .align_y(alignment::Vertical::Center);

        let mut thread = Column::new().spacing(10).padding(10);

        if !thread_view.is_revealed() {
            let mut starters = Column::new().spacing(8);
            for starter in &self.copy.starters {
                starters = starters.push(
                    button(text(starter.title.as_str()).size(15))
                        .on_press(Message::StarterPressed(starter.prompt().to_string()))
                        .padding(12)
                        .width(Length::Fill),
                );
            }
            let cta = button(text(self.copy.cta_label.as_str()).size(15))
                .on_press(Message::CtaPressed)
                .padding(12);
            thread = thread.push(starters).push(cta);
        }

        for entry in thread_view.rows() {
            thread = thread.push(bubble_row(entry.role, entry.text.as_str()));
        }

        if thread_view.is_typing() {
            thread = thread.push(bubble_row(Role::Assistant, TYPING_FRAMES[self.typing_frame]));
        }

        let input = text_editor(thread_view.input())
            .placeholder(self.copy.placeholder.as_str())
            .on_action(Message::EditorAction)
            .key_binding(composer_binding)
            .padding(12)
            .size(16)
            .height(Length::Shrink);

        let send = button(text(if sending { "Stop" } else { "Send" }).size(15))
            .on_press(Message::SendPressed)
            .padding(12);

        let composer = row![input, send]
            .spacing(8)
            .align_y(alignment::Vertical::Center);

        let content = column![
            header,
            scrollable(thread)
                .id(self.thread_id.clone())
                .height(Length::Fill),
            composer,
        ]
        .spacing(10)
        .padding(10);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        match self.preferences.theme {
            preferences::Theme::Light => Theme::Light,
            preferences::Theme::Dark => Theme::Dark,
        }
    }
}

/// Enter sends; Shift+Enter inserts a newline and reports the Enter with Shift held.
fn enter_binding(key: &Key, modifiers: Modifiers) -> Option<text_editor::Binding<Message>> {
    if *key != Key::Named(Named::Enter) {
        return None;
    }

    if modifiers.shift() {
        Some(text_editor::Binding::Sequence(vec![
            text_editor::Binding::Enter,
            text_editor::Binding::Custom(Message::EnterPressed { shift: true }),
        ]))
    } else {
        Some(text_editor::Binding::Custom(Message::EnterPressed { shift: false }))
    }
}

fn composer_binding(key_press: text_editor::KeyPress) -> Option<text_editor::Binding<Message>> {
    if key_press.status != text_editor::Status::Focused {
        return None;
    }

    enter_binding(&key_press.key, key_press.modifiers)
        .or_else(|| text_editor::Binding::from_key_press(key_press))
}

fn bubble_row(role: Role, body: &str) -> Element<'_, Message> {
    let bubble = container(text(body).size(15))
        .padding(10)
        .max_width(360)
        .style(container::rounded_box);

    match role {
        Role::User => container(bubble)
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right)
            .into(),
        Role::Assistant => row![text("🍓").size(20), bubble]
            .spacing(6)
            .width(Length::Fill)
            .into(),
    }
}
