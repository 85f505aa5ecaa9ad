//! single-screen chat over bevy_llm_chat.
//! - status line, scrollable transcript, prompt row with a send button.
//! - enter sends, backspace edits, mouse wheel scrolls.
//! - the ui only reacts to `ConversationChanged` events; it never reads the
//!   store except to edit the draft.
//!
//! env:
//!   LLM_BACKEND      (default openai; e.g. ollama, anthropic)
//!   LLM_BASE_URL     (optional)
//!   OPENAI_API_KEY / LLM_API_KEY
//!   LLM_MODEL        (default gpt-5)
//!   CHAT_CONFIG      (optional path to a json ChatConfig; overrides the above)

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy_llm_chat::{
    ChatConfig, ChatPlugin, ChatSet, ConversationChanged, ConversationStore, LanguageModelHandle,
    LlmModel, Message, SendMessage,
};

const LINE_HEIGHT: f32 = 21.0;

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct StatusText;
#[derive(Component)]
struct MessageList;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct BtnSend;

// ---------------------- main ----------------------

fn load_config() -> ChatConfig {
    let Ok(path) = std::env::var("CHAT_CONFIG") else {
        return ChatConfig::from_env();
    };
    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|text| ChatConfig::from_json(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(cfg) => {
            info!(target: "chat", "loaded config from {}", path);
            cfg
        }
        Err(e) => {
            warn!(target: "chat", "CHAT_CONFIG '{}' unusable ({}); falling back to env", path, e);
            ChatConfig::from_env()
        }
    }
}

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let config = load_config();
    let model = LlmModel::new(config.clone());

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(config)
        .insert_resource(LanguageModelHandle::new(model))
        .add_plugins(DefaultPlugins)
        .add_plugins(ChatPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (handle_text_input, btn_send, scroll_transcript).before(ChatSet::Intake))
        .add_systems(Update, on_conversation_changed.after(ChatSet::Publish))
        .run();
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands, store: Res<ConversationStore>) {
    commands.spawn(Camera2d);

    let style_16 = TextFont {
        font_size: 16.0,
        ..default()
    };
    let style_12 = TextFont {
        font_size: 12.0,
        ..default()
    };

    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            // status line
            p.spawn((
                Text::new(store.status()),
                style_12.clone(),
                TextColor(Color::srgb(0.6, 0.6, 0.6)),
                StatusText,
            ));

            // transcript
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_grow: 1.0,
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(12.0),
                    padding: UiRect::all(Val::Px(8.0)),
                    overflow: Overflow::scroll_y(),
                    ..default()
                },
                ScrollPosition::default(),
                BackgroundColor(Color::NONE),
                MessageList,
            ));

            // prompt row: [ text field ] [send]
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Auto,
                    column_gap: Val::Px(8.0),
                    flex_direction: FlexDirection::Row,
                    align_items: AlignItems::Center,
                    ..default()
                },
                BackgroundColor(Color::NONE),
            ))
            .with_children(|row| {
                row.spawn((
                    Node {
                        flex_grow: 1.0,
                        min_height: Val::Px(30.0),
                        padding: UiRect::axes(Val::Px(8.0), Val::Px(6.0)),
                        ..default()
                    },
                    BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
                ))
                .with_children(|field| {
                    field.spawn((
                        Text::new(prompt_label(store.draft())),
                        style_16.clone(),
                        TextColor(Color::WHITE),
                        PromptText,
                    ));
                });

                row.spawn((
                    Button,
                    Node {
                        width: Val::Px(70.0),
                        height: Val::Px(30.0),
                        align_items: AlignItems::Center,
                        justify_content: JustifyContent::Center,
                        ..default()
                    },
                    BackgroundColor(Color::srgb(0.2, 0.2, 0.25)),
                    BtnSend,
                ))
                .with_children(|b| {
                    b.spawn((Text::new("Send"), style_16.clone(), TextColor(Color::WHITE)));
                });
            });
        });
}

fn prompt_label(draft: &str) -> String {
    if draft.is_empty() {
        "Type a message... |".to_string()
    } else {
        format!("{draft} |")
    }
}

// ---------------------- input ----------------------

fn handle_text_input(
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    mut store: ResMut<ConversationStore>,
    mut ev_send: EventWriter<SendMessage>,
) {
    let mut draft = store.draft().to_string();
    for ev in ev_kbd.read() {
        if ev.state.is_pressed()
            && let Some(txt) = &ev.text
        {
            draft.extend(txt.chars().filter(|c| !c.is_control()));
        }
    }
    if keys.just_pressed(KeyCode::Backspace) {
        draft.pop();
    }
    if draft != store.draft() {
        store.set_draft(draft);
    }

    if keys.just_pressed(KeyCode::Enter) {
        info!(target: "chat", "enter -> send");
        ev_send.write(SendMessage);
    }
}

fn btn_send(
    mut q: Query<(&Interaction, &mut BackgroundColor), (Changed<Interaction>, With<BtnSend>)>,
    mut ev_send: EventWriter<SendMessage>,
) {
    for (i, mut bg) in &mut q {
        match *i {
            Interaction::Pressed => {
                bg.0 = Color::srgb(0.3, 0.3, 0.35);
                info!(target: "chat", "send clicked");
                ev_send.write(SendMessage);
            }
            Interaction::Hovered => bg.0 = Color::srgb(0.25, 0.25, 0.3),
            Interaction::None => bg.0 = Color::srgb(0.2, 0.2, 0.25),
        }
    }
}

fn scroll_transcript(
    mut ev_wheel: EventReader<MouseWheel>,
    mut q: Query<&mut ScrollPosition, With<MessageList>>,
) {
    let dy: f32 = ev_wheel
        .read()
        .map(|ev| match ev.unit {
            MouseScrollUnit::Line => ev.y * LINE_HEIGHT,
            MouseScrollUnit::Pixel => ev.y,
        })
        .sum();
    if dy == 0.0 {
        return;
    }
    for mut pos in &mut q {
        pos.offset_y = (pos.offset_y - dy).max(0.0);
    }
}

// ---------------------- store events ----------------------

fn spawn_bubble(list: &mut ChildSpawnerCommands, message: &Message) {
    let (justify, bg) = if message.is_user() {
        (JustifyContent::FlexEnd, Color::srgba(0.2, 0.4, 1.0, 0.2))
    } else {
        (JustifyContent::FlexStart, Color::srgba(0.5, 0.5, 0.5, 0.2))
    };
    list.spawn(Node {
        width: Val::Percent(100.0),
        justify_content: justify,
        ..default()
    })
    .with_children(|row| {
        row.spawn((
            Node {
                max_width: Val::Percent(75.0),
                padding: UiRect::all(Val::Px(10.0)),
                ..default()
            },
            BackgroundColor(bg),
            BorderRadius::all(Val::Px(12.0)),
        ))
        .with_children(|bubble| {
            bubble.spawn((
                Text::new(message.content()),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
        });
    });
}

fn on_conversation_changed(
    mut commands: Commands,
    mut ev: EventReader<ConversationChanged>,
    mut q_list: Query<(Entity, &mut ScrollPosition), With<MessageList>>,
    mut q_status: Query<&mut Text, (With<StatusText>, Without<PromptText>)>,
    mut q_prompt: Query<&mut Text, (With<PromptText>, Without<StatusText>)>,
) {
    for change in ev.read() {
        match change {
            ConversationChanged::MessageAppended(message) => {
                debug!(target: "chat", "append {:?} ({} chars)", message.origin(), message.content().len());
                if let Ok((list, mut scroll)) = q_list.single_mut() {
                    commands
                        .entity(list)
                        .with_children(|c| spawn_bubble(c, message));
                    // layout clamps this to the real bottom
                    scroll.offset_y = f32::MAX;
                }
            }
            ConversationChanged::DraftChanged(draft) => {
                if let Ok(mut t) = q_prompt.single_mut() {
                    t.0 = prompt_label(draft);
                }
            }
            ConversationChanged::StatusChanged(status) => {
                info!(target: "chat", "status -> {}", status);
                if let Ok(mut t) = q_status.single_mut() {
                    t.0 = status.clone();
                }
            }
        }
    }
}
