//! Semi-supervised training loop
//!
//! One `Trainer` drives any `SslAlgorithm`:
//! - the algorithm turns a batch into a weighted loss
//! - the trainer checks the loss, runs backward, accumulates gradients and
//!   steps the optimizer following an `AccumulationPolicy`
//! - the unsupervised weight comes from a `Warmup` stepped per iteration or
//!   per epoch
//! - scalars go to a `Recorder`; failures there are logged, never fatal
//! - after each epoch: validation on the inner model, best-model checkpoint,
//!   then the post-epoch hooks in list order

use burn::{
    module::AutodiffModule,
    optim::{GradientsAccumulator, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::dataset::{LabeledBatch, SslBatch, SslLoader};
use crate::model::config::TrainingConfig;
use crate::model::SslModel;
use crate::ssl::{Warmup, WarmupUnit};
use crate::training::accumulation::AccumulationPolicy;
use crate::training::algorithm::SslAlgorithm;
use crate::training::checkpoint::CheckpointSink;
use crate::training::hooks::{BestMetric, HookAction, PostEpochHook};
use crate::training::loss::LossKind;
use crate::training::recorder::{EpochMetrics, NullRecorder, Recorder, ScalarMeans};
use crate::utils::error::{Result, SslError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::TargetKind;

/// Training state for monitoring
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Micro-steps run so far (one per batch)
    pub global_step: usize,
    /// Optimizer updates applied so far
    pub optimizer_steps: usize,
    /// Learning rate used by the next update
    pub learning_rate: f64,
    /// Mean training loss per epoch
    pub train_losses: Vec<f64>,
    /// Whether a hook asked to stop
    pub stopped_early: bool,
}

impl TrainingState {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Default::default()
        }
    }
}

type Checkpointing<B, M> = (BestMetric, Box<dyn CheckpointSink<B, M>>);

/// Trainer for one model, one optimizer and one algorithm
pub struct Trainer<B, M, O, A, const D: usize>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    model: M,
    optimizer: O,
    algorithm: A,
    warmup: Warmup,
    warmup_unit: WarmupUnit,
    accumulation: AccumulationPolicy,
    accumulator: GradientsAccumulator<M>,
    pending: usize,
    recorder: Box<dyn Recorder>,
    hooks: Vec<Box<dyn PostEpochHook>>,
    checkpoint: Option<Checkpointing<B, M>>,
    epoch_means: ScalarMeans,
    rng: ChaCha8Rng,
    device: B::Device,
    config: TrainingConfig,
    state: TrainingState,
}

impl<B, M, O, A, const D: usize> Trainer<B, M, O, A, D>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SslModel<B, D>,
    M::InnerModule: SslModel<B::InnerBackend, D>,
    O: Optimizer<M, B>,
    A: SslAlgorithm<B, M, D>,
{
    /// Create a trainer.
    ///
    /// Validates `config` and lets the algorithm inspect the model, so a
    /// model missing something the algorithm needs fails here rather than
    /// in the middle of an epoch.
    pub fn new(
        model: M,
        optimizer: O,
        algorithm: A,
        warmup: Warmup,
        warmup_unit: WarmupUnit,
        config: TrainingConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        algorithm.check_model(&model)?;

        info!(
            "{} trainer: {} epochs, lr = {}, accumulation every {} step(s), lambda_u warmup over {} {:?} step(s)",
            algorithm.name(),
            config.epochs,
            config.learning_rate,
            config.accumulation.interval,
            warmup.n_steps(),
            warmup_unit
        );

        Ok(Self {
            model,
            optimizer,
            algorithm,
            warmup,
            warmup_unit,
            accumulation: config.accumulation,
            accumulator: GradientsAccumulator::new(),
            pending: 0,
            recorder: Box::new(NullRecorder),
            hooks: Vec::new(),
            checkpoint: None,
            epoch_means: ScalarMeans::default(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            device,
            state: TrainingState::new(config.learning_rate),
            config,
        })
    }

    /// Send scalars to `recorder` instead of discarding them
    pub fn with_recorder(mut self, recorder: impl Recorder + 'static) -> Self {
        self.recorder = Box::new(recorder);
        self
    }

    /// Append a post-epoch hook; hooks run in the order they were added
    pub fn with_hook(mut self, hook: impl PostEpochHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Hand the model to `sink` whenever `tracker`'s metric reaches a new best
    pub fn with_checkpoint(mut self, tracker: BestMetric, sink: impl CheckpointSink<B, M> + 'static) -> Self {
        self.checkpoint = Some((tracker, Box::new(sink)));
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn warmup(&self) -> &Warmup {
        &self.warmup
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Run one micro-step.
    ///
    /// Order: loss, finiteness check, backward, accumulate, update when the
    /// policy says so, warmup step, recording.
    ///
    /// # Returns
    /// * The step loss, or `NonFiniteLoss` before any gradient is applied
    pub fn train_step(&mut self, batch: SslBatch<B, D>, is_last_batch: bool) -> Result<f64> {
        let lambda_u = self.warmup.value();
        let output = self
            .algorithm
            .step(&self.model, batch, lambda_u, &mut self.rng, &self.device)?;

        let loss_value: f64 = output.loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(SslError::NonFiniteLoss {
                step: self.state.global_step,
                value: loss_value,
            });
        }
        self.algorithm.commit_step();

        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.accumulator.accumulate(&self.model, grads);
        self.pending += 1;

        if self.accumulation.should_flush(self.pending, is_last_batch) {
            self.apply_pending();
        }

        if self.warmup_unit == WarmupUnit::Iteration {
            self.warmup.step();
        }

        self.record("train/loss", loss_value);
        for (name, value) in output.scalars {
            self.record(&format!("train/{}", name), value);
        }
        self.record("train/lr", self.state.learning_rate);

        if self.state.global_step % self.config.log_interval == 0 {
            debug!(
                "  Step {}: loss = {:.4}, lambda_u = {:.4}",
                self.state.global_step, loss_value, lambda_u
            );
        }
        self.state.global_step += 1;

        Ok(loss_value)
    }

    /// Train over every batch of `epoch`
    ///
    /// # Returns
    /// * Epoch means of every recorded training scalar
    pub fn train_epoch<L>(&mut self, loader: &mut L, epoch: usize) -> Result<EpochMetrics>
    where
        L: SslLoader<B, D> + ?Sized,
    {
        self.state.epoch = epoch;
        self.epoch_means = ScalarMeans::default();

        let mut batches = loader.batches(epoch).peekable();
        let mut num_batches = 0;
        while let Some(batch) = batches.next() {
            let is_last = batches.peek().is_none();
            self.train_step(batch?, is_last)?;
            num_batches += 1;
        }

        if num_batches == 0 {
            return Err(SslError::Dataset(format!("loader yielded no batches for epoch {}", epoch + 1)));
        }

        let metrics = std::mem::take(&mut self.epoch_means).into_metrics(epoch);
        if let Some(loss) = metrics.get("train/loss") {
            self.state.train_losses.push(loss);
        }
        Ok(metrics)
    }

    /// Evaluate the inner (non-autodiff) model.
    ///
    /// # Returns
    /// * `val/acc` (or `val/fscore`) and `val/<criterion>`, averaged over examples
    /// * `val/max`, the mean highest class probability, for multi-class targets
    pub fn evaluate(&self, batches: &[LabeledBatch<B::InnerBackend, D>]) -> EpochMetrics {
        self.evaluate_model(&self.model.valid(), batches)
    }

    /// Same metrics as `evaluate`, for any model of the trained kind, such as
    /// a reloaded checkpoint.
    pub fn evaluate_model(
        &self,
        model: &M::InnerModule,
        batches: &[LabeledBatch<B::InnerBackend, D>],
    ) -> EpochMetrics {
        let activation = self.algorithm.activation();
        let kind = self.algorithm.target_kind();
        let criterion = LossKind::for_targets(kind);

        let mut score_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut max_sum = 0.0;
        let mut total = 0usize;

        for batch in batches {
            let rows = batch.inputs.dims()[0];
            let probs = activation.apply(model.forward(batch.inputs.clone()), 1);
            let loss: f64 = criterion
                .compute(probs.clone(), batch.targets.clone())
                .into_scalar()
                .elem();
            let max: f64 = probs.clone().max_dim(1).mean().into_scalar().elem();

            score_sum += kind.score(probs, batch.targets.clone()) * rows as f64;
            loss_sum += loss * rows as f64;
            max_sum += max * rows as f64;
            total += rows;
        }

        let mut metrics = EpochMetrics::new(self.state.epoch);
        if total > 0 {
            metrics.insert(format!("val/{}", kind.metric_name()), score_sum / total as f64);
            metrics.insert(format!("val/{}", criterion), loss_sum / total as f64);
            if kind == TargetKind::MultiClass {
                metrics.insert("val/max", max_sum / total as f64);
            }
        }
        metrics
    }

    /// Train for the configured number of epochs.
    ///
    /// # Arguments
    /// * `loader` - training batches
    /// * `validation` - labeled batches on the inner backend, may be empty
    ///
    /// # Returns
    /// * The metrics of every epoch that ran
    pub fn fit<L>(
        &mut self,
        loader: &mut L,
        validation: &[LabeledBatch<B::InnerBackend, D>],
    ) -> Result<Vec<EpochMetrics>>
    where
        L: SslLoader<B, D> + ?Sized,
    {
        let epochs = self.config.epochs;
        let mut logger = TrainingLogger::new(epochs);
        let mut history = Vec::with_capacity(epochs);
        let headline = format!("val/{}", self.algorithm.target_kind().metric_name());

        for epoch in 0..epochs {
            logger.start_epoch(epoch, loader.len());

            let mut metrics = self.train_epoch(loader, epoch)?;

            if !validation.is_empty() {
                let val = self.evaluate(validation);
                for (name, value) in val.iter() {
                    self.record(name, value);
                }
                metrics.extend(val);
            }

            if self.warmup_unit == WarmupUnit::Epoch {
                self.warmup.step();
            }

            if let Some((tracker, sink)) = self.checkpoint.as_mut() {
                match tracker.update(&metrics) {
                    Some(value) => {
                        logger.log_new_best(tracker.name(), value);
                        sink.save_best(&self.model, epoch, tracker.name(), value)?;
                    }
                    None if metrics.get(tracker.name()).is_none() => {
                        warn!("Checkpoint metric {} was not recorded this epoch", tracker.name());
                    }
                    None => {}
                }
            }

            for hook in self.hooks.iter_mut() {
                match hook.on_epoch_end(epoch, &metrics) {
                    HookAction::Continue => {}
                    HookAction::SetLearningRate(lr) => {
                        debug!("Hook {} set learning rate to {:.6}", hook.name(), lr);
                        self.state.learning_rate = lr;
                    }
                    HookAction::Stop => {
                        info!("Hook {} requested stop after epoch {}", hook.name(), epoch + 1);
                        self.state.stopped_early = true;
                    }
                }
            }

            if let Err(e) = self.recorder.flush() {
                warn!("Failed to flush recorder: {}", e);
            }

            logger.end_epoch(
                metrics.get("train/loss").unwrap_or(f64::NAN),
                metrics.get(&headline).map(|value| (headline.as_str(), value)),
                self.state.learning_rate,
            );
            history.push(metrics);

            if self.state.stopped_early {
                break;
            }
        }

        logger.log_complete(history.len());
        Ok(history)
    }

    fn apply_pending(&mut self) {
        let grads = self.accumulator.grads();
        self.model = self
            .optimizer
            .step(self.state.learning_rate, self.model.clone(), grads);
        self.pending = 0;
        self.state.optimizer_steps += 1;
    }

    fn record(&mut self, name: &str, value: f64) {
        if name.starts_with("train/") {
            self.epoch_means.add(name, value);
        }
        if let Err(e) = self.recorder.add_scalar(name, self.state.global_step, value) {
            warn!("Recorder rejected {} at step {}: {}", name, self.state.global_step, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::UnlabeledBatch;
    use crate::model::config::{MixMatchConfig, ReMixMatchConfig};
    use crate::model::{Activation, ToyClassifier, ToyClassifierConfig};
    use crate::ssl::guess::tests::PassThrough;
    use crate::ssl::{one_hot, LabelGuesser, Rotation};
    use crate::training::checkpoint::FileCheckpoint;
    use crate::training::mixmatch::MixMatch;
    use crate::training::recorder::MemoryRecorder;
    use crate::training::remixmatch::ReMixMatch;
    use burn::backend::Autodiff;
    use burn::optim::AdamConfig;
    use burn::tensor::{backend::Backend, Distribution, Tensor, TensorData};
    use burn_ndarray::NdArray;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;
    type TestDevice = <TestBackend as Backend>::Device;

    fn batch(device: &TestDevice) -> SslBatch<TestBackend, 2> {
        let view = Tensor::from_floats([[1.8, 0.2], [0.2, 1.8]], device);
        SslBatch {
            labeled: LabeledBatch {
                inputs: Tensor::from_floats([[2.0, 0.0], [0.0, 2.0]], device),
                targets: one_hot(&[0, 1], 2, device).unwrap(),
            },
            unlabeled: UnlabeledBatch {
                views: vec![view.clone(), view],
            },
        }
    }

    fn model(device: &TestDevice) -> ToyClassifier<TestBackend> {
        ToyClassifierConfig::new(2, 2).with_hidden_size(16).init(device)
    }

    fn config(epochs: usize, learning_rate: f64) -> TrainingConfig {
        TrainingConfig {
            epochs,
            learning_rate,
            checkpoint_metric: None,
            ..Default::default()
        }
    }

    fn trainer(
        epochs: usize,
        warmup: Warmup,
    ) -> Trainer<
        TestBackend,
        ToyClassifier<TestBackend>,
        impl Optimizer<ToyClassifier<TestBackend>, TestBackend>,
        MixMatch,
        2,
    > {
        let device = Default::default();
        let optimizer = AdamConfig::new().init::<TestBackend, ToyClassifier<TestBackend>>();
        let algorithm = MixMatch::new(MixMatchConfig::default()).unwrap();

        Trainer::new(
            model(&device),
            optimizer,
            algorithm,
            warmup,
            WarmupUnit::Iteration,
            config(epochs, 0.05),
            device,
        )
        .unwrap()
    }

    fn mixed_loss(model: &ToyClassifier<TestBackend>, device: &TestDevice) -> f64 {
        let mut algorithm = MixMatch::new(MixMatchConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let out = SslAlgorithm::<TestBackend, _, 2>::step(&mut algorithm, model, batch(device), 1.0, &mut rng, device)
            .unwrap();
        out.loss.into_scalar().elem()
    }

    #[test]
    fn test_oracle_pseudo_labels_are_true_one_hot() {
        let device: <NdArray as Backend>::Device = Default::default();
        let guesser = LabelGuesser::new(0.5, Activation::Softmax).unwrap();

        // Oracle logits: large margin towards the true class of each unlabeled row
        let view = Tensor::<NdArray, 2>::from_floats([[12.0, 0.0], [0.0, 12.0]], &device);
        let yu = guesser.guess(&PassThrough, &[view.clone(), view]).unwrap();

        let values: Vec<f32> = yu.into_data().to_vec().unwrap();
        let expected = [1.0, 0.0, 0.0, 1.0];
        for (v, e) in values.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-6, "{:?}", values);
        }
    }

    #[test]
    fn test_mixed_loss_decreases_after_50_steps() {
        let device = Default::default();
        let mut trainer = trainer(50, Warmup::constant(1.0).unwrap());
        let before = mixed_loss(trainer.model(), &device);

        let mut loader = vec![batch(&device)];
        let history = trainer.fit(&mut loader, &[]).unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(trainer.state().optimizer_steps, 50);

        let after = mixed_loss(trainer.model(), &device);
        assert!(after < before, "loss went from {} to {}", before, after);

        // Labeled examples end up classified correctly
        let inner = trainer.model().valid();
        let x = Tensor::<NdArray, 2>::from_floats([[2.0, 0.0], [0.0, 2.0]], &device);
        let pred: Vec<i64> = SslModel::<NdArray, 2>::forward(&inner, x)
            .argmax(1)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(pred, vec![0, 1]);
    }

    #[test]
    fn test_accumulation_flushes_on_interval_and_last_batch() {
        let device = Default::default();
        let optimizer = AdamConfig::new().init::<TestBackend, ToyClassifier<TestBackend>>();
        let mut training = config(1, 0.01);
        training.accumulation = AccumulationPolicy::every(2).unwrap();

        let mut trainer: Trainer<_, _, _, _, 2> = Trainer::new(
            model(&device),
            optimizer,
            MixMatch::new(MixMatchConfig::default()).unwrap(),
            Warmup::constant(1.0).unwrap(),
            WarmupUnit::Iteration,
            training,
            device,
        )
        .unwrap();

        let mut loader = vec![batch(&device), batch(&device), batch(&device)];
        trainer.fit(&mut loader, &[]).unwrap();

        assert_eq!(trainer.state().global_step, 3);
        assert_eq!(trainer.state().optimizer_steps, 2);
    }

    #[test]
    fn test_non_finite_loss_is_surfaced_before_update() {
        let device = Default::default();
        let mut trainer = trainer(1, Warmup::constant(1.0).unwrap());

        let mut bad = batch(&device);
        bad.labeled.inputs = Tensor::from_floats(
            TensorData::new(vec![f32::NAN, 0.0, 0.0, 2.0], [2, 2]),
            &device,
        );

        let err = trainer.train_step(bad, true).unwrap_err();
        assert!(err.is_divergence());
        assert_eq!(trainer.state().optimizer_steps, 0);
    }

    #[test]
    fn test_warmup_is_recorded_per_iteration() {
        let device = Default::default();
        let recorder = Rc::new(RefCell::new(MemoryRecorder::new()));
        let mut trainer = trainer(1, Warmup::new(1.0, 2).unwrap()).with_recorder(recorder.clone());

        let mut loader = vec![batch(&device); 4];
        trainer.fit(&mut loader, &[]).unwrap();

        let recorded = recorder.borrow();
        let lambdas: Vec<f64> = recorded
            .get("train/lambda_u")
            .unwrap()
            .iter()
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(lambdas, vec![0.0, 0.5, 1.0, 1.0]);
        assert_eq!(recorded.get("train/loss").unwrap().len(), 4);
        assert!(recorded.latest("train/acc_s_mix").is_some());
    }

    struct FailingRecorder;

    impl Recorder for FailingRecorder {
        fn add_scalar(&mut self, name: &str, _step: usize, _value: f64) -> Result<()> {
            Err(SslError::Recorder(format!("cannot store {}", name)))
        }

        fn flush(&mut self) -> Result<()> {
            Err(SslError::Recorder("disk full".to_string()))
        }
    }

    #[test]
    fn test_failing_recorder_does_not_abort_training() {
        let device = Default::default();
        let mut trainer = trainer(2, Warmup::constant(1.0).unwrap()).with_recorder(FailingRecorder);

        let mut loader = vec![batch(&device)];
        let history = trainer.fit(&mut loader, &[]).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_hooks_run_in_order_and_apply_actions() {
        let device = Default::default();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let calls = calls.clone();
            move |epoch: usize, _: &EpochMetrics| {
                calls.borrow_mut().push(("scheduler", epoch));
                HookAction::SetLearningRate(0.001)
            }
        };
        let second = {
            let calls = calls.clone();
            move |epoch: usize, metrics: &EpochMetrics| {
                assert!(metrics.get("train/loss").is_some());
                calls.borrow_mut().push(("stopper", epoch));
                if epoch == 1 {
                    HookAction::Stop
                } else {
                    HookAction::Continue
                }
            }
        };

        let mut trainer = trainer(5, Warmup::constant(1.0).unwrap())
            .with_hook(first)
            .with_hook(second);

        let mut loader = vec![batch(&device)];
        let history = trainer.fit(&mut loader, &[]).unwrap();

        assert_eq!(history.len(), 2);
        assert!(trainer.state().stopped_early);
        assert_eq!(trainer.state().learning_rate, 0.001);
        assert_eq!(
            *calls.borrow(),
            vec![("scheduler", 0), ("stopper", 0), ("scheduler", 1), ("stopper", 1)]
        );
    }

    struct CountingSink(Rc<RefCell<Vec<(usize, f64)>>>);

    impl CheckpointSink<TestBackend, ToyClassifier<TestBackend>> for CountingSink {
        fn save_best(
            &mut self,
            _model: &ToyClassifier<TestBackend>,
            epoch: usize,
            _metric: &str,
            value: f64,
        ) -> Result<()> {
            self.0.borrow_mut().push((epoch, value));
            Ok(())
        }
    }

    #[test]
    fn test_validation_and_best_checkpoint() {
        let device: TestDevice = Default::default();
        let saved = Rc::new(RefCell::new(Vec::new()));
        let mut trainer = trainer(3, Warmup::constant(1.0).unwrap()).with_checkpoint(
            BestMetric::new("val/acc", crate::training::hooks::MetricMode::Max),
            CountingSink(saved.clone()),
        );

        let inner_device: <NdArray as Backend>::Device = Default::default();
        let validation = vec![LabeledBatch {
            inputs: Tensor::<NdArray, 2>::from_floats([[2.0, 0.0], [0.0, 2.0]], &inner_device),
            targets: one_hot(&[0, 1], 2, &inner_device).unwrap(),
        }];

        let mut loader = vec![batch(&device)];
        let history = trainer.fit(&mut loader, &validation).unwrap();

        for metrics in &history {
            let acc = metrics.get("val/acc").unwrap();
            assert!((0.0..=1.0).contains(&acc));
            assert!(metrics.get("val/ce").unwrap().is_finite());
            let max = metrics.get("val/max").unwrap();
            assert!((0.5..=1.0).contains(&max), "{}", max);
        }

        let saved = saved.borrow();
        assert!(!saved.is_empty());
        assert_eq!(saved[0].0, 0);
        assert!(saved.windows(2).all(|w| w[1].1 > w[0].1));
    }

    #[test]
    fn test_reloaded_best_checkpoint_evaluates_like_the_trained_model() {
        let temp_dir = TempDir::new().unwrap();
        let device: TestDevice = Default::default();
        let mut trainer = trainer(3, Warmup::constant(1.0).unwrap());

        let inner_device: <NdArray as Backend>::Device = Default::default();
        let validation = vec![LabeledBatch {
            inputs: Tensor::<NdArray, 2>::from_floats([[2.0, 0.0], [0.0, 2.0], [1.5, 0.5]], &inner_device),
            targets: one_hot(&[0, 1, 0], 2, &inner_device).unwrap(),
        }];

        let mut loader = vec![batch(&device)];
        trainer.fit(&mut loader, &[]).unwrap();

        let mut sink = FileCheckpoint::new(temp_dir.path(), "best_model");
        sink.save_best(trainer.model(), 2, "val/acc", 1.0).unwrap();
        let reloaded = sink.load::<TestBackend, _>(model(&device), &device).unwrap();

        let trained = trainer.evaluate(&validation);
        let best = trainer.evaluate_model(&reloaded.valid(), &validation);
        assert_eq!(best.len(), 3);
        // Half-precision weights on disk
        for (name, value) in trained.iter() {
            let other = best.get(name).unwrap();
            assert!((value - other).abs() < 1e-2, "{}: {} vs {}", name, value, other);
        }
    }

    fn image_batch(device: &TestDevice, weak_pixel: f32) -> SslBatch<TestBackend, 4> {
        let images = |rows: usize| Tensor::<TestBackend, 4>::random([rows, 1, 4, 4], Distribution::Uniform(0.0, 1.0), device);
        let mut weak: Vec<f32> = images(3).into_data().to_vec().unwrap();
        weak[0] = weak_pixel;

        SslBatch {
            labeled: LabeledBatch {
                inputs: images(2),
                targets: one_hot(&[0, 1], 2, device).unwrap(),
            },
            unlabeled: UnlabeledBatch {
                views: vec![
                    Tensor::from_floats(TensorData::new(weak, [3, 1, 4, 4]), device),
                    images(3),
                    images(3),
                ],
            },
        }
    }

    #[test]
    fn test_rejected_step_does_not_poison_alignment() {
        let device: TestDevice = Default::default();
        let model = ToyClassifierConfig::new(16, 2)
            .with_hidden_size(8)
            .with_auxiliary_classes(Some(4))
            .init::<TestBackend>(&device);
        let optimizer = AdamConfig::new().init::<TestBackend, ToyClassifier<TestBackend>>();
        let algorithm = ReMixMatch::<TestBackend, _>::new(ReMixMatchConfig::default(), Rotation).unwrap();

        let mut trainer: Trainer<_, _, _, _, 4> = Trainer::new(
            model,
            optimizer,
            algorithm,
            Warmup::constant(1.5).unwrap(),
            WarmupUnit::Iteration,
            config(1, 0.01),
            device,
        )
        .unwrap();

        let err = trainer.train_step(image_batch(&device, f32::NAN), false).unwrap_err();
        assert!(err.is_divergence());
        assert!(trainer.algorithm().aligner().unlabeled().is_empty());

        for _ in 0..5 {
            let loss = trainer.train_step(image_batch(&device, 0.5), false).unwrap();
            assert!(loss.is_finite());
        }
        assert_eq!(trainer.algorithm().aligner().unlabeled().len(), 5);
        assert_eq!(trainer.algorithm().aligner().labeled().len(), 5);
    }

    #[test]
    fn test_remixmatch_without_auxiliary_head_fails_at_construction() {
        let device: TestDevice = Default::default();
        let model = ToyClassifierConfig::new(16, 2).init::<TestBackend>(&device);
        let optimizer = AdamConfig::new().init::<TestBackend, ToyClassifier<TestBackend>>();
        let algorithm = ReMixMatch::<TestBackend, _>::new(ReMixMatchConfig::default(), Rotation).unwrap();

        let result: Result<Trainer<_, _, _, _, 4>> = Trainer::new(
            model,
            optimizer,
            algorithm,
            Warmup::constant(1.5).unwrap(),
            WarmupUnit::Iteration,
            config(1, 0.01),
            device,
        );

        let Err(err) = result else {
            panic!("trainer accepted a model without a self-supervised head");
        };
        assert!(format!("{}", err).contains("forward_auxiliary"));
    }
}
