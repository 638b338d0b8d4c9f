use std::collections::BTreeMap;

use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use ragmap_shared::{Chunk, OverviewConfig, Question};

use crate::data;
use crate::overview_canvas::OverviewCanvas;

/// Newtype wrappers so each store signal gets its own context slot.
#[derive(Clone, Copy)]
pub(crate) struct Questions(pub RwSignal<Vec<Question>>);
#[derive(Clone, Copy)]
pub(crate) struct Chunks(pub RwSignal<Vec<Chunk>>);
#[derive(Clone, Copy)]
pub(crate) struct Config(pub RwSignal<OverviewConfig>);
#[derive(Clone, Copy)]
pub(crate) struct VisibleIds(pub RwSignal<Vec<u64>>);
#[derive(Clone, Copy)]
pub(crate) struct CurrentQuestion(pub RwSignal<Option<u64>>);
#[derive(Clone, Copy)]
pub(crate) struct CurrentGridCell(pub RwSignal<Option<String>>);
#[derive(Clone, Copy)]
pub(crate) struct GridChunks(pub RwSignal<BTreeMap<String, Vec<Chunk>>>);

#[derive(Clone, Debug, PartialEq)]
enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

const PANEL_CHUNK_LIMIT: usize = 20;

/// Root application component. Owns the store-side signals and loads data.
#[component]
pub fn App() -> impl IntoView {
    let questions: RwSignal<Vec<Question>> = RwSignal::new(Vec::new());
    let chunks: RwSignal<Vec<Chunk>> = RwSignal::new(Vec::new());
    let config: RwSignal<OverviewConfig> = RwSignal::new(OverviewConfig::default());
    let visible: RwSignal<Vec<u64>> = RwSignal::new(Vec::new());
    let current_question: RwSignal<Option<u64>> = RwSignal::new(None);
    let current_cell: RwSignal<Option<String>> = RwSignal::new(None);
    let grid_chunks: RwSignal<BTreeMap<String, Vec<Chunk>>> = RwSignal::new(BTreeMap::new());
    let search: RwSignal<String> = RwSignal::new(String::new());
    let load_state: RwSignal<LoadState> = RwSignal::new(LoadState::Loading);

    provide_context(Questions(questions));
    provide_context(Chunks(chunks));
    provide_context(Config(config));
    provide_context(VisibleIds(visible));
    provide_context(CurrentQuestion(current_question));
    provide_context(CurrentGridCell(current_cell));
    provide_context(GridChunks(grid_chunks));

    spawn_local(async move {
        let loaded_config = data::fetch_config().await;
        match data::fetch_snapshot().await {
            Ok(snapshot) => {
                config.set(loaded_config);
                chunks.set(snapshot.chunks);
                questions.set(snapshot.questions);
                load_state.set(LoadState::Ready);
            }
            Err(e) => {
                web_sys::console::error_1(&format!("Data load failed: {e}").into());
                load_state.set(LoadState::Failed(e));
            }
        }
    });

    // Filtered subset drives the foreground layer.
    Effect::new(move || {
        let query = search.get();
        let ids = questions.with(|qs| data::filter_visible(qs, &query));
        visible.set(ids);
    });

    let status = move || match load_state.get() {
        LoadState::Loading => "Loading…".to_string(),
        LoadState::Ready => format!(
            "{} questions · {} shown · {} chunks",
            questions.with(Vec::len),
            visible.with(Vec::len),
            chunks.with(Vec::len)
        ),
        LoadState::Failed(e) => format!("Load failed: {e}"),
    };

    let question_panel = move || {
        let id = current_question.get()?;
        let question = questions.with(|qs| qs.iter().find(|q| q.id == id).cloned())?;
        let answer = question.answer.clone();
        Some(view! {
            <section class="question-detail">
                <h3>{format!("Question #{}", question.id)}</h3>
                <p>{question.display_text()}</p>
                {answer.map(|a| view! { <p class="answer">{a}</p> })}
            </section>
        })
    };

    let cell_panel = move || {
        let cell = current_cell.get()?;
        let cell_chunks = grid_chunks.with(|m| m.get(&cell).cloned().unwrap_or_default());
        let total = cell_chunks.len();
        Some(view! {
            <section class="cell-detail">
                <h4>{format!("{cell} · {total} chunks")}</h4>
                <ul>
                    {cell_chunks
                        .into_iter()
                        .take(PANEL_CHUNK_LIMIT)
                        .map(|c| view! { <li>{c.text}</li> })
                        .collect_view()}
                </ul>
            </section>
        })
    };

    view! {
        <div style="display: flex; width: 100%; height: 100%;">
            <div style="flex: 1; position: relative; min-width: 0;">
                <OverviewCanvas />
            </div>
            <aside style="width: 320px; overflow-y: auto; padding: 12px; border-left: 1px solid #ddd; font-size: 13px;">
                <input
                    type="search"
                    placeholder="Filter questions"
                    style="width: 100%; box-sizing: border-box;"
                    prop:value=move || search.get()
                    on:input=move |ev| search.set(event_target_value(&ev))
                />
                <p class="status">{status}</p>
                {question_panel}
                {cell_panel}
            </aside>
        </div>
    }
}
