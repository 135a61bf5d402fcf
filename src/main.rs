use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use speakdrill::ai::GeminiBackend;
use speakdrill::document;
use speakdrill::exam::ExamOutcome;
use speakdrill::markup;
use speakdrill::sequencer::{
    ClipDescriptor, LoopPolicy, PlayMode, PlaybackOptions, SessionClock, StandardClipSource,
};
use speakdrill::store::{self, AudioRef, JsonFileStore, SentenceRecord};
use speakdrill::voice::{
    AudioSink, CaptureDevice, CpalCapture, CpalSink, Recorder, Recording, RenderedAudio, dsp,
};
use speakdrill::{AiClient, Config, MockExam, Playlist, PracticeSession, Sequencer};

/// speakdrill - Spoken language drills with generated speech and pronunciation feedback
#[derive(Parser)]
#[command(name = "speakdrill", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak sentences aloud in sequence
    Play {
        /// Sentences to speak
        texts: Vec<String>,
        /// Stored recordings to play after the sentences
        #[arg(long = "recording")]
        recordings: Vec<PathBuf>,
        /// Pitch offset for recordings, in semitones
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        detune: f32,
        /// Treat sentences as question/answer pairs with two voices
        #[arg(long)]
        pairs: bool,
        /// Voice for plain sentences
        #[arg(long, env = "SPEAKDRILL_VOICE")]
        voice: Option<String>,
        /// Number of passes
        #[arg(short, long, default_value = "1", conflicts_with = "forever")]
        loops: u32,
        /// Repeat until interrupted
        #[arg(long)]
        forever: bool,
        /// Play only this entry (0-based)
        #[arg(long)]
        single: Option<usize>,
        /// Speed multiplier
        #[arg(short, long)]
        speed: Option<f32>,
        /// Let speed changes alter pitch
        #[arg(long)]
        no_preserve_pitch: bool,
    },
    /// Record until you stop talking and save a WAV file
    Record {
        /// Output file
        #[arg(short, long, default_value = "recording.wav")]
        out: PathBuf,
    },
    /// Generate sentences on a topic, repeat them and get scored
    Practice {
        /// Topic of the drill
        topic: String,
        /// Number of sentences
        #[arg(short, long, default_value = "3")]
        count: usize,
    },
    /// Look up a word
    Define {
        word: String,
    },
    /// List or manage past practice sessions
    History {
        /// Show sentences of one session
        #[arg(long, conflicts_with = "delete")]
        show: Option<String>,
        /// Delete a session
        #[arg(long)]
        delete: Option<String>,
    },
    /// Show or rename sentence categories
    Categories {
        /// Category to rename (0-2) followed by its new label
        #[arg(long, num_args = 2, value_names = ["INDEX", "LABEL"])]
        set: Option<Vec<String>>,
    },
    /// Export practice history to a document
    Export {
        path: PathBuf,
    },
    /// Import practice history from a document
    Import {
        path: PathBuf,
    },
    /// Run a mock spoken exam
    Exam {
        /// Questions the examiner asks
        #[arg(required = true)]
        questions: Vec<String>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,speakdrill=info",
        1 => "info,speakdrill=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "loaded configuration");

    match cli.command {
        Command::Play {
            texts,
            recordings,
            detune,
            pairs,
            voice,
            loops,
            forever,
            single,
            speed,
            no_preserve_pitch,
        } => {
            let voice = voice.unwrap_or_else(|| config.ai.voice.clone());
            let mut clips: Vec<ClipDescriptor> = if pairs {
                if texts.len() % 2 != 0 {
                    anyhow::bail!("--pairs needs an even number of sentences");
                }
                let pairs = texts.chunks(2).map(|p| (p[0].clone(), p[1].clone()));
                Playlist::from_pairs(
                    pairs,
                    &config.playback.question_voice,
                    &config.playback.answer_voice,
                )?
                .iter()
                .cloned()
                .collect()
            } else {
                texts
                    .iter()
                    .map(|t| ClipDescriptor::speech(t.as_str(), voice.as_str()))
                    .collect()
            };
            clips.extend(
                recordings
                    .into_iter()
                    .map(|p| ClipDescriptor::recording(p).with_detune(detune)),
            );

            let options = PlaybackOptions {
                loops: if forever {
                    LoopPolicy::Infinite
                } else {
                    LoopPolicy::Times(loops)
                },
                speed: speed.unwrap_or(config.playback.speed),
                preserve_pitch: config.playback.preserve_pitch && !no_preserve_pitch,
                mode: single.map_or(PlayMode::Continuous, |index| PlayMode::Single { index }),
            };

            cmd_play(&config, Playlist::new(clips)?, options).await
        }
        Command::Record { out } => cmd_record(&config, &out).await,
        Command::Practice { topic, count } => cmd_practice(&config, &topic, count).await,
        Command::Define { word } => cmd_define(&config, &word).await,
        Command::History { show, delete } => cmd_history(&config, show.as_deref(), delete.as_deref()),
        Command::Categories { set } => cmd_categories(&config, set.as_deref()),
        Command::Export { path } => {
            let state = store::load_state(&state_store(&config))?;
            document::write_document(&path, &state)?;
            println!("Exported {} sessions to {}", state.sessions.len(), path.display());
            Ok(())
        }
        Command::Import { path } => {
            let store = state_store(&config);
            let mut state = store::load_state(&store)?;
            let parsed = document::read_document(&path)?;
            let found = parsed.sessions.len();
            let added = parsed.apply_to(&mut state);
            store::save_state(&store, &state)?;
            println!("Imported {added} new sessions ({found} in document)");
            Ok(())
        }
        Command::Exam { questions } => cmd_exam(&config, &questions).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

fn state_store(config: &Config) -> JsonFileStore {
    JsonFileStore::new(config.state_path())
}

fn ai_client(config: &Config) -> anyhow::Result<Arc<AiClient>> {
    let backend = GeminiBackend::new(&config.ai)?;
    Ok(Arc::new(AiClient::from_config(Arc::new(backend), &config.ai)))
}

fn sequencer(config: &Config, ai: &Arc<AiClient>) -> anyhow::Result<Sequencer> {
    let sink = Arc::new(CpalSink::new()?);
    let source = Arc::new(StandardClipSource::new(Arc::clone(ai)));
    Ok(Sequencer::new(sink, source, config.playback.timing))
}

fn default_options(config: &Config) -> PlaybackOptions {
    PlaybackOptions {
        speed: config.playback.speed,
        preserve_pitch: config.playback.preserve_pitch,
        ..PlaybackOptions::default()
    }
}

async fn cmd_play(config: &Config, playlist: Playlist, options: PlaybackOptions) -> anyhow::Result<()> {
    let ai = ai_client(config)?;
    let sequencer = sequencer(config, &ai)?;

    tokio::select! {
        result = sequencer.play_to_end(playlist, options) => result?,
        _ = tokio::signal::ctrl_c() => {
            sequencer.stop();
            println!("\nStopped");
        }
    }
    Ok(())
}

async fn cmd_record(config: &Config, out: &std::path::Path) -> anyhow::Result<()> {
    let recorder = Recorder::new(Arc::new(CpalCapture), config.silence);
    println!("Recording... stops after {} ms of silence (Ctrl-C to stop now)", config.silence.silence_duration.as_millis());

    let handle = recorder.start_capture().await?;
    let recording = tokio::select! {
        recording = handle.finished() => recording?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("recording interrupted"),
    };

    std::fs::write(out, recording.to_wav()?)?;
    println!(
        "Saved {:.1}s to {} ({:?})",
        recording.elapsed.as_secs_f32(),
        out.display(),
        recording.stop_reason
    );
    Ok(())
}

async fn cmd_practice(config: &Config, topic: &str, count: usize) -> anyhow::Result<()> {
    let store = state_store(config);
    let categories = store::load_state(&store)?.categories;

    let ai = ai_client(config)?;
    let sequencer = sequencer(config, &ai)?;
    let recorder = Recorder::new(Arc::new(CpalCapture), config.silence);
    let options = default_options(config);

    let recordings_dir = config.recordings_dir();
    std::fs::create_dir_all(&recordings_dir)?;

    println!("Generating {count} sentences about \"{topic}\"...\n");
    let sentences = ai.generate_sentences(topic, count, &categories).await?;
    let keywords: Vec<&str> = topic.split_whitespace().filter(|w| w.len() > 3).collect();

    let mut session = PracticeSession::new(topic);

    for (i, sentence) in sentences.iter().enumerate() {
        let highlighted = markup::highlight_keywords(&sentence.text, &keywords);
        println!(
            "{}. [{}] {}",
            i + 1,
            categories.get(sentence.category).unwrap_or("?"),
            markup::render_ansi(&markup::parse(&highlighted))
        );
        println!("   {}", sentence.translation);

        let playlist = Playlist::new(vec![ClipDescriptor::speech(
            sentence.text.as_str(),
            config.ai.voice.as_str(),
        )])?;
        sequencer.play_to_end(playlist, options).await?;

        println!("   Your turn...");
        let recording = recorder.start_capture().await?.finished().await?;
        let wav = recording.to_wav()?;
        let path = recordings_dir.join(format!("{}-{}.wav", session.id, i + 1));
        std::fs::write(&path, &wav)?;

        let evaluation = ai
            .evaluate_recording(&wav, Recording::MIME_TYPE, &sentence.text)
            .await?;
        let marked = markup::mark_mistakes(&sentence.text, &evaluation.mistakes);
        println!("   Score: {}/100", evaluation.score);
        println!("   {}", markup::render_ansi(&markup::parse(&marked)));
        for mistake in &evaluation.mistakes {
            println!("   - {}: {}", mistake.word, mistake.issue);
        }
        println!("   {}\n", evaluation.feedback);

        session.sentences.push(SentenceRecord {
            text: sentence.text.clone(),
            translation: sentence.translation.clone(),
            category: sentence.category,
            score: Some(evaluation.score),
        });
        session.recordings.push(AudioRef {
            sentence: i,
            path,
            mime_type: Recording::MIME_TYPE.to_string(),
        });
    }

    if let Some(avg) = session.average_score() {
        println!("Average score: {avg:.0}");
    }

    // Reload in case another command changed the file meanwhile
    let mut state = store::load_state(&store)?;
    state.add_session(session);
    store::save_state(&store, &state)?;
    Ok(())
}

async fn cmd_define(config: &Config, word: &str) -> anyhow::Result<()> {
    let ai = ai_client(config)?;
    let definition = ai.define_word(word, &config.native_language).await?;

    match &definition.part_of_speech {
        Some(pos) => println!("{} ({pos})", definition.word),
        None => println!("{}", definition.word),
    }
    println!("  {}", definition.meaning);
    if let Some(example) = &definition.example {
        println!("  e.g. {example}");
    }
    Ok(())
}

fn cmd_history(config: &Config, show: Option<&str>, delete: Option<&str>) -> anyhow::Result<()> {
    let store = state_store(config);
    let mut state = store::load_state(&store)?;

    if let Some(id) = delete {
        let Some(removed) = state.remove_session(id) else {
            anyhow::bail!("no session with id {id}");
        };
        store::save_state(&store, &state)?;
        println!("Deleted \"{}\"", removed.topic);
        return Ok(());
    }

    if let Some(id) = show {
        let Some(session) = state.session(id) else {
            anyhow::bail!("no session with id {id}");
        };
        println!("{} - {}", session.timestamp.format("%Y-%m-%d %H:%M"), session.topic);
        for (i, sentence) in session.sentences.iter().enumerate() {
            let score = sentence.score.map_or_else(|| "-".to_string(), |s| s.to_string());
            println!(
                "  {}. [{}] {} ({score})",
                i + 1,
                state.categories.get(sentence.category).unwrap_or("?"),
                sentence.text
            );
            if !sentence.translation.is_empty() {
                println!("     {}", sentence.translation);
            }
        }
        return Ok(());
    }

    if state.sessions.is_empty() {
        println!("No practice sessions yet");
        return Ok(());
    }

    for session in &state.sessions {
        let avg = session
            .average_score()
            .map_or_else(|| "-".to_string(), |a| format!("{a:.0}"));
        println!(
            "{}  {}  {:<30}  {} sentences  avg {avg}",
            session.id,
            session.timestamp.format("%Y-%m-%d %H:%M"),
            session.topic,
            session.sentences.len()
        );
    }
    Ok(())
}

fn cmd_categories(config: &Config, set: Option<&[String]>) -> anyhow::Result<()> {
    let store = state_store(config);
    let mut state = store::load_state(&store)?;

    if let Some([index, label]) = set {
        let index: usize = index.parse()?;
        state.categories.rename(index, label)?;
        store::save_state(&store, &state)?;
    }

    for (i, label) in state.categories.labels().iter().enumerate() {
        println!("{i}: {label}");
    }
    Ok(())
}

async fn cmd_exam(config: &Config, questions: &[String]) -> anyhow::Result<()> {
    let ai = ai_client(config)?;
    let sequencer = sequencer(config, &ai)?;
    let recorder = Arc::new(Recorder::new(Arc::new(CpalCapture), config.silence));
    let exam = MockExam::new(sequencer, recorder, ai, config.playback.question_voice.clone());

    let mut stages = exam.watch();
    let progress = tokio::spawn(async move {
        while stages.changed().await.is_ok() {
            let stage = *stages.borrow_and_update();
            tracing::info!(?stage, "exam stage");
        }
    });

    let outcome = tokio::select! {
        outcome = exam.run(questions) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            exam.cancel();
            println!("\nExam cancelled");
            progress.abort();
            return Ok(());
        }
    };
    progress.abort();

    let (turns, completed) = match outcome {
        ExamOutcome::Completed(turns) => (turns, true),
        ExamOutcome::Cancelled(turns) => (turns, false),
    };

    for (i, turn) in turns.iter().enumerate() {
        println!("Q{}: {}", i + 1, turn.question);
        println!("A{}: {}", i + 1, turn.transcript);
        if !turn.ended_by_silence() {
            println!("    (answer cut off after {:.0}s)", turn.recording.elapsed.as_secs_f32());
        }
    }
    if !completed {
        println!("Exam ended early");
    }
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;
    let rate = sink.output_rate();
    let audio = RenderedAudio::new(dsp::tone(440.0, 2.0, rate, 0.3), rate);

    println!("Playing {} samples at {rate} Hz...", audio.samples().len());
    let clock = SessionClock::new();
    sink.play(&audio, &clock.begin()).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Show a live input level meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut stream = tokio::task::spawn_blocking(|| CpalCapture.open()).await??;
    println!("Sample rate: {} Hz", stream.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = stream.drain();
        let energy = dsp::rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    drop(stream);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}
