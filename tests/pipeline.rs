use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tempfile::{TempDir, tempdir};

use citodet::{
  model::{
    BoxedDetector, Detector, Device, LoaderConfig, ModelError, ModelFamily, ModelLoader,
    ModelProvider, TwoStageArch, TwoStageOutput, XyxyRows, YoloBox, YoloResult, YoloResults,
  },
  output::{Report, ReportEntry},
  task::{OneShotTask, PipelineError, PipelineState},
};

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Clone)]
struct Canned<R>(R);

impl<R: Clone> Detector for Canned<R> {
  type Raw = R;

  fn run(&self, _image: &RgbImage) -> Result<R, ModelError> {
    Ok(self.0.clone())
  }
}

#[derive(Default)]
struct CannedProvider {
  rows: XyxyRows,
  results: YoloResults,
  two_stage: TwoStageOutput,
}

impl ModelProvider for CannedProvider {
  fn single_stage_a(&self, _: &Path, _: Device) -> Result<BoxedDetector<XyxyRows>, ModelError> {
    Ok(Box::new(Canned(self.rows.clone())))
  }

  fn single_stage_b(
    &self,
    _: ModelFamily,
    _: &Path,
    _: Device,
  ) -> Result<BoxedDetector<YoloResults>, ModelError> {
    Ok(Box::new(Canned(self.results.clone())))
  }

  fn two_stage(
    &self,
    _: TwoStageArch,
    _: &Path,
    _: Device,
  ) -> Result<BoxedDetector<TwoStageOutput>, ModelError> {
    Ok(Box::new(Canned(self.two_stage.clone())))
  }
}

struct Workspace {
  dir: TempDir,
  image: PathBuf,
}

impl Workspace {
  fn new() -> Self {
    let dir = tempdir().unwrap();
    let weights = dir.path().join("weights");
    std::fs::create_dir(&weights).unwrap();
    for family in ModelFamily::ALL {
      std::fs::write(weights.join(format!("{}.pt", family.tag())), b"stub").unwrap();
    }
    let image = dir.path().join("cell.png");
    RgbImage::from_pixel(64, 64, WHITE).save(&image).unwrap();
    Self { dir, image }
  }

  fn output_image(&self) -> PathBuf {
    self.dir.path().join("cell_output.png")
  }

  fn task(&self, provider: CannedProvider) -> OneShotTask<CannedProvider> {
    let config = LoaderConfig::default().weights_dir(self.dir.path().join("weights"));
    OneShotTask::new(ModelLoader::new(config, provider))
  }
}

fn entry(class: &str, confidence: f64) -> ReportEntry {
  ReportEntry {
    class: class.to_string(),
    confidence,
  }
}

#[test]
fn single_stage_rows_end_to_end() {
  let ws = Workspace::new();
  let mut task = ws.task(CannedProvider {
    rows: XyxyRows {
      rows: vec![[10.0, 10.0, 50.0, 50.0, 0.91, 4.0]],
    },
    ..Default::default()
  });

  let report = task.run_task(&ws.image, "yolov5").unwrap();
  assert_eq!(
    report,
    Report::Detections {
      detections: vec![entry("NILM", 0.91)]
    }
  );
  assert_eq!(
    report.to_json().unwrap(),
    r#"{"detections":[{"class":"NILM","confidence":0.91}]}"#
  );
  assert_eq!(task.state(), PipelineState::Done);

  let annotated = image::open(ws.output_image()).unwrap().to_rgb8();
  assert_eq!(annotated.dimensions(), (64, 64));
  for (x, y) in [(10, 30), (12, 30), (50, 30), (48, 30), (30, 50)] {
    assert_eq!(annotated.get_pixel(x, y), &RED, "({}, {})", x, y);
  }
  assert_eq!(annotated.get_pixel(13, 30), &WHITE);
  assert_eq!(annotated.get_pixel(30, 30), &WHITE);

  let source = image::open(&ws.image).unwrap().to_rgb8();
  assert_eq!(source.get_pixel(10, 30), &WHITE);
}

#[test]
fn single_stage_results_flatten_in_order() {
  let ws = Workspace::new();
  let boxed = |cls: f32, conf: f32| YoloBox {
    cls,
    conf,
    xyxy: [5.0, 5.0, 20.0, 20.0],
  };
  let mut task = ws.task(CannedProvider {
    results: YoloResults {
      results: vec![
        YoloResult {
          boxes: vec![boxed(2.0, 0.814), boxed(0.0, 0.5)],
        },
        YoloResult {
          boxes: vec![boxed(5.0, 0.257)],
        },
      ],
    },
    ..Default::default()
  });

  let report = task.run_task(&ws.image, "YOLOv12").unwrap();
  assert_eq!(
    report,
    Report::Detections {
      detections: vec![
        entry("HSIL", 0.81),
        entry("ASC-H", 0.5),
        entry("SCC", 0.26)
      ]
    }
  );
}

#[test]
fn two_stage_filters_and_offsets_labels() {
  let ws = Workspace::new();
  let raw = TwoStageOutput {
    boxes: vec![[1.0, 1.0, 30.0, 30.0]; 4],
    scores: vec![0.95, 0.30, 0.2999, 0.6],
    labels: vec![1, 2, 3, 5],
  };

  let mut proposal = ws.task(CannedProvider {
    two_stage: raw.clone(),
    ..Default::default()
  });
  let report = proposal.run_task(&ws.image, "fasterrcnn").unwrap();
  assert_eq!(
    report,
    Report::Detections {
      detections: vec![entry("ASC-US", 0.95), entry("HSIL", 0.3), entry("SCC", 0.6)]
    }
  );

  let mut anchor = ws.task(CannedProvider {
    two_stage: raw,
    ..Default::default()
  });
  let report = anchor.run_task(&ws.image, "retinanet").unwrap();
  assert_eq!(
    report,
    Report::Detections {
      detections: vec![
        entry("ASC-H", 0.95),
        entry("ASC-US", 0.3),
        entry("NILM", 0.6)
      ]
    }
  );
}

#[test]
fn empty_output_still_writes_image() {
  let ws = Workspace::new();
  let mut task = ws.task(CannedProvider::default());
  let report = task.run_task(&ws.image, "yolov8").unwrap();
  assert_eq!(report.to_json().unwrap(), r#"{"detections":[]}"#);

  let annotated = image::open(ws.output_image()).unwrap().to_rgb8();
  let source = image::open(&ws.image).unwrap().to_rgb8();
  assert_eq!(annotated, source);
}

#[test]
fn out_of_range_label_fails_without_output_image() {
  let ws = Workspace::new();
  let mut task = ws.task(CannedProvider {
    two_stage: TwoStageOutput {
      boxes: vec![[1.0, 1.0, 30.0, 30.0]],
      scores: vec![0.9],
      labels: vec![0],
    },
    ..Default::default()
  });

  let err = task.run_task(&ws.image, "retinanet").unwrap_err();
  assert!(matches!(
    err,
    PipelineError::Model(ModelError::LabelOutOfRange(-1))
  ));
  assert_eq!(task.state(), PipelineState::Failed);
  assert!(!ws.output_image().exists());
}

#[test]
fn unreadable_image_fails_after_loading() {
  let ws = Workspace::new();
  let mut task = ws.task(CannedProvider::default());
  let err = task
    .run_task(&ws.dir.path().join("missing.png"), "yolov5")
    .unwrap_err();
  assert!(matches!(err, PipelineError::Input(_)));
  assert_eq!(task.state(), PipelineState::Failed);
}

#[test]
fn existing_output_is_overwritten() {
  let ws = Workspace::new();
  std::fs::write(ws.output_image(), b"stale").unwrap();
  let mut task = ws.task(CannedProvider::default());
  task.run_task(&ws.image, "yolov5").unwrap();
  assert!(image::open(ws.output_image()).is_ok());
}
