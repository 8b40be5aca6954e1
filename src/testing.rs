//! Scripted fakes shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::analysis::{PersonRecord, Record};
use crate::camera::{CameraDriver, CameraError, Frame, PixelFormat};
use crate::command::{SpeechError, SpeechRecognizer};
use crate::output::{OutputSink, ResultPresenter};
use crate::session::{
    Analyzer, AnalyzerError, AnalyzerFactory, Evidence, MatchResult, ScanKind,
};

/// Ordered log of camera and analyzer activity shared between fakes
pub type Timeline = Arc<Mutex<Vec<String>>>;

pub fn timeline() -> Timeline {
    Arc::new(Mutex::new(Vec::new()))
}

/// A tiny all-black frame
pub fn blank_frame() -> Frame {
    Frame {
        data: vec![0; 12],
        width: 2,
        height: 2,
        format: PixelFormat::Rgb24,
        sequence: 0,
    }
}

/// A person match as a face analyzer would report it
pub fn person_match(id: &str) -> MatchResult {
    MatchResult {
        subject_id: id.to_string(),
        record: Record::Person(PersonRecord {
            name: format!("Subject {id}"),
            age: None,
            description: String::new(),
            offence: String::new(),
            status: String::new(),
        }),
        evidence: Evidence::FaceDistance { distance: 0.3 },
    }
}

// ---------------------------------------------------------------------------
// speech

/// One scripted recognizer response
#[derive(Debug, Clone)]
pub enum Utterance {
    Say(String),
    /// Respond after blocking for the given delay
    After(Duration, String),
    Silence,
    ServiceDown,
}

impl Utterance {
    pub fn say(text: &str) -> Self {
        Utterance::Say(text.to_string())
    }

    pub fn after(delay: Duration, text: &str) -> Self {
        Utterance::After(delay, text.to_string())
    }
}

/// Plays back utterances in order; silence once the script runs out
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Utterance>>,
    calibrations: AtomicU32,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<Utterance>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calibrations: AtomicU32::new(0),
        }
    }

    pub fn calibrations(&self) -> u32 {
        self.calibrations.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn calibrate(&self) -> Result<(), SpeechError> {
        self.calibrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn recognize(&self) -> Result<String, SpeechError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Utterance::Say(text)) => Ok(text),
            Some(Utterance::After(delay, text)) => {
                thread::sleep(delay);
                Ok(text)
            }
            Some(Utterance::Silence) => Err(SpeechError::NoUtterance),
            Some(Utterance::ServiceDown) => {
                Err(SpeechError::Service("backend offline".to_string()))
            }
            None => {
                thread::sleep(Duration::from_millis(5));
                Err(SpeechError::NoUtterance)
            }
        }
    }
}

/// Never returns until `release` is called
pub struct HangingRecognizer {
    gate: Mutex<Receiver<()>>,
    opener: Mutex<Option<Sender<()>>>,
}

impl HangingRecognizer {
    pub fn new() -> Self {
        let (opener, gate) = mpsc::channel();
        Self {
            gate: Mutex::new(gate),
            opener: Mutex::new(Some(opener)),
        }
    }

    /// Let every blocked call return
    pub fn release(&self) {
        self.opener.lock().unwrap().take();
    }
}

impl SpeechRecognizer for HangingRecognizer {
    fn recognize(&self) -> Result<String, SpeechError> {
        let gate = match self.gate.lock() {
            Ok(gate) => gate,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = gate.recv();
        Err(SpeechError::NoUtterance)
    }
}

// ---------------------------------------------------------------------------
// camera

#[derive(Default)]
struct DriverState {
    calls: Vec<&'static str>,
    captures: u64,
    fail_start: bool,
    fail_capture_after: Option<u64>,
    panic_on_capture: bool,
    fail_stop: bool,
    frame_delay: Duration,
    timeline: Option<Timeline>,
}

/// Records every lifecycle call; clones share the same log
#[derive(Clone)]
pub struct RecordingDriver {
    state: Arc<Mutex<DriverState>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DriverState {
                frame_delay: Duration::from_millis(1),
                ..DriverState::default()
            })),
        }
    }

    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    /// Capture succeeds `frames` times in total, then fails
    pub fn failing_capture_after(self, frames: u64) -> Self {
        self.state.lock().unwrap().fail_capture_after = Some(frames);
        self
    }

    /// The first capture panics, taking the session task down with it
    pub fn panicking_capture(self) -> Self {
        self.state.lock().unwrap().panic_on_capture = true;
        self
    }

    /// `stop` is recorded but reports a hung device
    pub fn failing_stop(self) -> Self {
        self.state.lock().unwrap().fail_stop = true;
        self
    }

    pub fn with_frame_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().frame_delay = delay;
        self
    }

    /// Also log `start`/`stop` to a shared timeline
    pub fn with_timeline(self, timeline: Timeline) -> Self {
        self.state.lock().unwrap().timeline = Some(timeline);
        self
    }

    /// Lifecycle calls in order, captures excluded
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn captures(&self) -> u64 {
        self.state.lock().unwrap().captures
    }

    fn record(state: &mut DriverState, call: &'static str) {
        state.calls.push(call);
        if let Some(timeline) = &state.timeline {
            timeline.lock().unwrap().push(call.to_string());
        }
    }
}

impl CameraDriver for RecordingDriver {
    fn start(&mut self) -> Result<(), CameraError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(CameraError::Start("device busy".to_string()));
        }
        Self::record(&mut state, "start");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "stop");
        if state.fail_stop {
            return Err(CameraError::Stop("device hung".to_string()));
        }
        Ok(())
    }

    fn capture_array(&mut self) -> Result<Frame, CameraError> {
        // the lock must be released before panicking or it stays poisoned
        let crash = self.state.lock().unwrap().panic_on_capture;
        if crash {
            panic!("camera driver crashed");
        }

        let (sequence, delay) = {
            let mut state = self.state.lock().unwrap();
            if state.fail_capture_after.is_some_and(|limit| state.captures >= limit) {
                return Err(CameraError::Capture("device unplugged".to_string()));
            }
            state.captures += 1;
            (state.captures, state.frame_delay)
        };
        thread::sleep(delay);

        Ok(Frame {
            sequence,
            ..blank_frame()
        })
    }
}

// ---------------------------------------------------------------------------
// analysis

/// What a scripted analyzer does with one frame
#[derive(Debug, Clone, Copy)]
pub enum FrameOutcome {
    Nothing,
    Fail,
    Match(&'static str),
    Panic,
}

/// Plays back one outcome per frame, then repeats its fallback
pub struct ScriptedAnalyzer {
    script: VecDeque<FrameOutcome>,
    fallback: FrameOutcome,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<FrameOutcome>) -> Self {
        Self {
            script: script.into(),
            fallback: FrameOutcome::Nothing,
        }
    }

    pub fn never() -> Self {
        Self::new(Vec::new())
    }

    pub fn always_failing() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: FrameOutcome::Fail,
        }
    }

    /// Nothing for `frame - 1` frames, then a match for `id`
    pub fn matching_on(frame: usize, id: &'static str) -> Self {
        let mut script = vec![FrameOutcome::Nothing; frame.saturating_sub(1)];
        script.push(FrameOutcome::Match(id));
        Self::new(script)
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn analyze(&mut self, _frame: &Frame) -> Result<Option<MatchResult>, AnalyzerError> {
        match self.script.pop_front().unwrap_or(self.fallback) {
            FrameOutcome::Nothing => Ok(None),
            FrameOutcome::Fail => Err(AnalyzerError::Extraction("blurred frame".to_string())),
            FrameOutcome::Match(id) => Ok(Some(person_match(id))),
            FrameOutcome::Panic => panic!("extractor crashed"),
        }
    }
}

/// Hands out scripted analyzers per scan kind
#[derive(Default)]
pub struct ScriptedAnalyzers {
    face: Vec<FrameOutcome>,
    plate: Vec<FrameOutcome>,
    unavailable: Option<ScanKind>,
    timeline: Option<Timeline>,
}

impl ScriptedAnalyzers {
    /// Analyzers that never match
    pub fn new() -> Self {
        Self::default()
    }

    pub fn face_script(mut self, script: Vec<FrameOutcome>) -> Self {
        self.face = script;
        self
    }

    pub fn unavailable(mut self, kind: ScanKind) -> Self {
        self.unavailable = Some(kind);
        self
    }

    /// Log `analyzer <kind>` to a shared timeline on every create
    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = Some(timeline);
        self
    }
}

impl AnalyzerFactory for ScriptedAnalyzers {
    fn create(&self, kind: ScanKind) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        if let Some(timeline) = &self.timeline {
            let name = match kind {
                ScanKind::Face => "analyzer face",
                ScanKind::Plate => "analyzer plate",
            };
            timeline.lock().unwrap().push(name.to_string());
        }
        if self.unavailable == Some(kind) {
            return Err(AnalyzerError::NotConfigured(kind));
        }
        let script = match kind {
            ScanKind::Face => self.face.clone(),
            ScanKind::Plate => self.plate.clone(),
        };
        Ok(Box::new(ScriptedAnalyzer::new(script)))
    }
}

// ---------------------------------------------------------------------------
// output

/// Keeps every narration
#[derive(Default)]
pub struct RecordingSink {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn has_spoken(&self, text: &str) -> bool {
        self.spoken.lock().unwrap().iter().any(|s| s == text)
    }
}

impl OutputSink for RecordingSink {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// Keeps every presented match
#[derive(Default)]
pub struct RecordingPresenter {
    presented: Mutex<Vec<MatchResult>>,
}

impl RecordingPresenter {
    pub fn presented(&self) -> Vec<MatchResult> {
        self.presented.lock().unwrap().clone()
    }
}

impl ResultPresenter for RecordingPresenter {
    fn present(&self, result: &MatchResult) {
        self.presented.lock().unwrap().push(result.clone());
    }
}
