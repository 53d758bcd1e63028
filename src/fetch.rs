use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use miette::IntoDiagnostic;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    io::{cookie_jar, find_target, temp_path, Target},
    outside::{Arg, Pipeline, PipelineRunner, Stage, DIGEST_USER},
    result::{Error, Result},
    session::Directory,
    settings::Tools,
    types::{Extension, Recording},
};

/// What to produce out of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Keep the device container as-is
    Raw,
    /// Decode to an MPEG program stream
    Decode,
    /// Decode then transcode to H.264
    Encode,
}

impl Operation {
    pub fn extension(self) -> Extension {
        match self {
            Operation::Raw => Extension::Tivo,
            Operation::Decode => Extension::Mpg,
            Operation::Encode => Extension::M4v,
        }
    }
}

/// How a fetch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The recording was named by the user
    Explicit,
    /// The recording is part of a "fetch everything" run
    Bulk,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub operation: Operation,
    /// Skip the recording instead of renaming the output when it already exists
    pub skip: bool,
    /// Put episodes of a series in their own directory
    pub show_dir: bool,
    pub out_dir: PathBuf,
    /// Wait after every transfer, so that the device is not flooded with sessions
    pub pause: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The recording has been written to this path
    Done(PathBuf),
    /// The device is still recording it
    SkippedInProgress,
    /// A previous fetch already produced this file
    SkippedExisting(PathBuf),
}

/// Downloads recordings, taking care of naming the output files
pub struct Fetcher<'a> {
    directory: &'a Directory<'a>,
    runner: &'a dyn PipelineRunner,
    tools: &'a Tools,
    options: &'a FetchOptions,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        directory: &'a Directory<'a>,
        runner: &'a dyn PipelineRunner,
        tools: &'a Tools,
        options: &'a FetchOptions,
    ) -> Self {
        Self {
            directory,
            runner,
            tools,
            options,
        }
    }

    /// Fetch the recording with the given identifier
    pub fn fetch_id(&self, out: &mut dyn Write, id: &str) -> Result<Outcome> {
        let recording = self.directory.resolve_one(id)?;
        self.fetch(out, &recording, Origin::Explicit)
    }

    pub fn fetch(&self, out: &mut dyn Write, recording: &Recording, origin: Origin) -> Result<Outcome> {
        if origin == Origin::Bulk && recording.in_progress {
            info!("'{recording}' is still being recorded, skipping it");
            return Ok(Outcome::SkippedInProgress);
        }

        let base = self.base_name(recording)?;
        let ext = self.options.operation.extension();
        let target = match find_target(&base, ext, self.options.skip)? {
            Target::Free(path) => path,
            Target::Taken(path) => {
                writeln!(out, "Skipping {}: already fetched", path.display()).into_diagnostic()?;
                return Ok(Outcome::SkippedExisting(path));
            }
        };

        let res = self.transfer(out, recording, &target);

        debug!("Pausing for {:?}", self.options.pause);
        std::thread::sleep(self.options.pause);

        res.map(|()| Outcome::Done(target))
    }

    /// Path of the output file, without extension.
    ///
    /// Creates its parent directory if needed.
    fn base_name(&self, recording: &Recording) -> Result<PathBuf> {
        let (dir, name) = if self.options.show_dir && recording.is_episode() {
            let mut name = String::new();
            if let Some(number) = recording.episode_number {
                name.push_str(&format!("S{number:04} "));
            }
            if let Some(episode) = &recording.episode_title {
                name.push_str(episode);
            }

            let series_dir = self.options.out_dir.join(file_safe(&recording.title));
            (series_dir, name.trim_end().to_string())
        } else {
            (self.options.out_dir.clone(), recording.display_name())
        };

        std::fs::create_dir_all(&dir)
            .map_err(|err| Error::filesystem("create directory", &dir, err))?;

        Ok(dir.join(file_safe(&name)))
    }

    /// Run the pipeline into a temporary file, then move it to the target
    fn transfer(&self, out: &mut dyn Write, recording: &Recording, target: &Path) -> Result<()> {
        let tmp = temp_path(target);

        // The jar is deleted when dropped, so it must outlive the pipeline
        let cookie_jar = cookie_jar()?;
        let pipeline = self.build_pipeline(recording, &cookie_jar);

        writeln!(out, "{pipeline} > {}", tmp.display()).into_diagnostic()?;
        info!("Fetching '{recording}' into {}", target.display());

        self.runner.run(&pipeline, &tmp)?;
        drop(cookie_jar);

        std::fs::rename(&tmp, target).map_err(|err| Error::filesystem("rename", &tmp, err))?;
        info!("'{recording}' fetched into {}", target.display());
        Ok(())
    }

    fn build_pipeline(&self, recording: &Recording, cookie_jar: &NamedTempFile) -> Pipeline {
        let mak = self.directory.access_key();

        let download = Stage::new(&self.tools.downloader)
            .args(["--silent", "--show-error", "--fail", "--digest"])
            .arg("--user")
            .arg(Arg::secret(
                format!("{DIGEST_USER}:{mak}"),
                format!("{DIGEST_USER}:****"),
            ))
            .arg("--cookie-jar")
            .arg(cookie_jar.path())
            .arg(recording.content_url.as_str());
        let mut pipeline = Pipeline::new(download);

        if matches!(self.options.operation, Operation::Decode | Operation::Encode) {
            pipeline = pipeline.then(
                Stage::new(&self.tools.decoder)
                    .arg("--mak")
                    .arg(Arg::secret(mak, "****"))
                    .arg("-"),
            );
        }

        if self.options.operation == Operation::Encode {
            // Baseline profile keeps the output playable on low-end devices
            pipeline = pipeline.then(
                Stage::new(&self.tools.transcoder)
                    .args(["-hide_banner", "-loglevel", "error"])
                    .args(["-i", "pipe:0"])
                    .args(["-c:v", "libx264", "-profile:v", "baseline", "-level", "3.0"])
                    .args(["-preset", "fast", "-crf", "26"])
                    .args(["-c:a", "aac", "-b:a", "128k"])
                    .args(["-movflags", "frag_keyframe+empty_moov"])
                    .args(["-f", "ipod", "pipe:1"]),
            );
        }

        pipeline
    }
}

/// Replace the characters that cannot appear in a file name
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fs, time::Instant};

    use super::*;
    use crate::{outside::FakePvr, types::sample_recording};

    /// Write fixed content instead of running anything, remembering what it was asked
    #[derive(Default)]
    struct FakeRunner {
        runs: RefCell<Vec<(String, PathBuf)>>,
        fail: bool,
    }

    impl PipelineRunner for FakeRunner {
        fn run(&self, pipeline: &Pipeline, output: &Path) -> Result<()> {
            self.runs
                .borrow_mut()
                .push((pipeline.to_string(), output.to_path_buf()));
            if self.fail {
                fs::write(output, "partial").unwrap();
                return Err(crate::result::err_msg("stage failed"));
            }
            fs::write(output, vec![b'x'; 500]).unwrap();
            Ok(())
        }
    }

    fn tools() -> Tools {
        Tools {
            downloader: "curl".to_string(),
            decoder: "tivodecode".to_string(),
            transcoder: "ffmpeg".to_string(),
        }
    }

    fn options(dir: &Path, operation: Operation) -> FetchOptions {
        FetchOptions {
            operation,
            skip: false,
            show_dir: false,
            out_dir: dir.to_path_buf(),
            pause: Duration::ZERO,
        }
    }

    struct Env {
        pvr: FakePvr,
        runner: FakeRunner,
        tools: Tools,
    }

    impl Env {
        fn new(recordings: Vec<Recording>) -> Self {
            Self {
                pvr: FakePvr { recordings },
                runner: FakeRunner::default(),
                tools: tools(),
            }
        }

        fn fetch_id(&self, options: &FetchOptions, id: &str) -> (Result<Outcome>, String) {
            let directory = Directory::new(&self.pvr);
            let fetcher = Fetcher::new(&directory, &self.runner, &self.tools, options);
            let mut out: Vec<u8> = Vec::new();
            let res = fetcher.fetch_id(&mut out, id);
            (res, String::from_utf8(out).unwrap())
        }

        fn fetch_bulk(&self, options: &FetchOptions, recording: &Recording) -> Result<Outcome> {
            let directory = Directory::new(&self.pvr);
            let fetcher = Fetcher::new(&directory, &self.runner, &self.tools, options);
            fetcher.fetch(&mut Vec::<u8>::new(), recording, Origin::Bulk)
        }
    }

    #[test]
    fn raw_fetch_writes_to_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);

        let (res, printed) = env.fetch_id(&options(dir.path(), Operation::Raw), "1");

        let target = dir.path().join("Lost - Pilot.tivo");
        assert_eq!(res.unwrap(), Outcome::Done(target.clone()));
        assert_eq!(fs::metadata(&target).unwrap().len(), 500);
        assert!(!dir.path().join("Lost - Pilot.tivo.tmp").exists());

        let runs = env.runner.runs.borrow();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].1, dir.path().join("Lost - Pilot.tivo.tmp"));
        assert!(printed.starts_with("curl "));
        assert!(printed.contains(&runs[0].0));
    }

    #[test]
    fn pipeline_stages_follow_operation() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);

        env.fetch_id(&options(dir.path(), Operation::Raw), "1").0.unwrap();
        env.fetch_id(&options(dir.path(), Operation::Decode), "1").0.unwrap();
        env.fetch_id(&options(dir.path(), Operation::Encode), "1").0.unwrap();

        let runs = env.runner.runs.borrow();
        let stages: Vec<usize> = runs.iter().map(|(p, _)| p.split(" | ").count()).collect();
        assert_eq!(stages, [1, 2, 3]);
        assert!(runs[1].0.contains("| tivodecode --mak **** -"));
        assert!(runs[2].0.contains("| ffmpeg "));
        assert!(runs[2].0.contains("baseline"));
        assert!(dir.path().join("Lost - Pilot.mpg").exists());
        assert!(dir.path().join("Lost - Pilot.m4v").exists());
    }

    #[test]
    fn access_key_is_never_printed() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);

        let (res, printed) = env.fetch_id(&options(dir.path(), Operation::Encode), "1");
        res.unwrap();

        assert!(!printed.contains("0123456789"));
        assert!(printed.contains("--user tivo:****"));
        assert!(printed.contains("--digest"));
        assert!(printed.contains("--cookie-jar"));
    }

    #[test]
    fn collisions_get_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);
        let opts = options(dir.path(), Operation::Raw);

        let names: Vec<_> = (0..3)
            .map(|_| match env.fetch_id(&opts, "1").0.unwrap() {
                Outcome::Done(path) => path.file_name().unwrap().to_string_lossy().into_owned(),
                other => panic!("Unexpected outcome {other:?}"),
            })
            .collect();

        assert_eq!(names, ["Lost - Pilot.tivo", "Lost - Pilot.1.tivo", "Lost - Pilot.2.tivo"]);
    }

    #[test]
    fn skip_leaves_existing_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);
        let mut opts = options(dir.path(), Operation::Raw);
        opts.skip = true;

        env.fetch_id(&opts, "1").0.unwrap();
        for _ in 0..2 {
            let (res, printed) = env.fetch_id(&opts, "1");
            let existing = dir.path().join("Lost - Pilot.tivo");
            assert_eq!(res.unwrap(), Outcome::SkippedExisting(existing));
            assert!(printed.starts_with("Skipping "));
        }

        assert_eq!(env.runner.runs.borrow().len(), 1);
        assert!(!dir.path().join("Lost - Pilot.1.tivo").exists());
    }

    #[test]
    fn small_leftover_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);
        let target = dir.path().join("Lost - Pilot.tivo");
        fs::write(&target, vec![b'y'; 100]).unwrap();

        let (res, _) = env.fetch_id(&options(dir.path(), Operation::Raw), "1");

        assert_eq!(res.unwrap(), Outcome::Done(target.clone()));
        assert_eq!(fs::metadata(&target).unwrap().len(), 500);
    }

    #[test]
    fn failed_pipeline_never_produces_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Env::new(vec![sample_recording("1")]);
        env.runner.fail = true;

        let (res, _) = env.fetch_id(&options(dir.path(), Operation::Decode), "1");

        assert!(res.is_err());
        assert!(!dir.path().join("Lost - Pilot.mpg").exists());
        // The leftover does not count as a fetched file on the next run
        env.runner.fail = false;
        let (res, _) = env.fetch_id(&options(dir.path(), Operation::Decode), "1");
        assert_eq!(res.unwrap(), Outcome::Done(dir.path().join("Lost - Pilot.mpg")));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);

        let (res, _) = env.fetch_id(&options(dir.path(), Operation::Raw), "2");

        assert!(matches!(res, Err(Error::NotFound(_))));
        assert!(env.runner.runs.borrow().is_empty());
    }

    #[test]
    fn in_progress_only_skipped_in_bulk() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = sample_recording("1");
        rec.in_progress = true;
        let env = Env::new(vec![rec.clone()]);
        let opts = options(dir.path(), Operation::Raw);

        assert_eq!(env.fetch_bulk(&opts, &rec).unwrap(), Outcome::SkippedInProgress);
        assert!(env.runner.runs.borrow().is_empty());

        let (res, _) = env.fetch_id(&opts, "1");
        assert!(matches!(res.unwrap(), Outcome::Done(_)));
    }

    #[test]
    fn show_dir_uses_series_and_episode() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);
        let mut opts = options(dir.path(), Operation::Decode);
        opts.show_dir = true;

        let (res, _) = env.fetch_id(&opts, "1");

        let target = dir.path().join("Lost").join("S0101 Pilot.mpg");
        assert_eq!(res.unwrap(), Outcome::Done(target.clone()));
        assert!(target.exists());
    }

    #[test]
    fn show_dir_without_episode_number() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = sample_recording("1");
        rec.episode_number = None;
        let env = Env::new(vec![rec]);
        let mut opts = options(dir.path(), Operation::Raw);
        opts.show_dir = true;

        let (res, _) = env.fetch_id(&opts, "1");

        assert_eq!(res.unwrap(), Outcome::Done(dir.path().join("Lost").join("Pilot.tivo")));
    }

    #[test]
    fn show_dir_ignored_for_non_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = sample_recording("1");
        rec.episode_number = None;
        rec.episode_title = None;
        let env = Env::new(vec![rec]);
        let mut opts = options(dir.path(), Operation::Raw);
        opts.show_dir = true;

        let (res, _) = env.fetch_id(&opts, "1");

        assert_eq!(res.unwrap(), Outcome::Done(dir.path().join("Lost - 2009-05-26.tivo")));
        assert!(!dir.path().join("Lost").exists());
    }

    #[test]
    fn pause_follows_every_transfer_but_not_skips() {
        const PAUSE: Duration = Duration::from_millis(50);
        let dir = tempfile::tempdir().unwrap();
        let mut rec = sample_recording("1");
        rec.in_progress = true;
        let mut env = Env::new(vec![rec.clone()]);
        let mut opts = options(dir.path(), Operation::Raw);
        opts.pause = PAUSE;
        opts.skip = true;

        let start = Instant::now();
        env.fetch_id(&opts, "1").0.unwrap();
        assert!(start.elapsed() >= PAUSE);

        let start = Instant::now();
        assert!(matches!(env.fetch_id(&opts, "1").0.unwrap(), Outcome::SkippedExisting(_)));
        assert_eq!(env.fetch_bulk(&opts, &rec).unwrap(), Outcome::SkippedInProgress);
        assert!(start.elapsed() < PAUSE);

        env.runner.fail = true;
        opts.skip = false;
        let start = Instant::now();
        assert!(env.fetch_id(&opts, "1").0.is_err());
        assert!(start.elapsed() >= PAUSE);
    }

    #[test]
    fn failed_rename_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);
        fs::create_dir(dir.path().join("Lost - Pilot.tivo")).unwrap();

        let (res, _) = env.fetch_id(&options(dir.path(), Operation::Raw), "1");

        let tmp = dir.path().join("Lost - Pilot.tivo.tmp");
        assert!(matches!(res, Err(Error::Filesystem { action: "rename", path, .. }) if path == tmp));
    }

    #[test]
    fn blocked_series_directory_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::new(vec![sample_recording("1")]);
        fs::write(dir.path().join("Lost"), "not a directory").unwrap();
        let mut opts = options(dir.path(), Operation::Raw);
        opts.show_dir = true;

        let (res, _) = env.fetch_id(&opts, "1");

        assert!(matches!(
            res,
            Err(Error::Filesystem { action: "create directory", .. })
        ));
        assert!(env.runner.runs.borrow().is_empty());
    }

    #[test]
    fn separators_are_replaced() {
        assert_eq!(file_safe("AC/DC: Live\\Loud"), "AC-DC: Live-Loud");
    }
}
