use crate::error::{Error, Result};
use crate::models::ClassificationCandidate;
use crate::pipeline::FoodClassifier;
use crate::preprocess::RgbaBitmap;
use crossbeam_channel::{bounded, Sender};
use std::thread;

struct Request {
    bitmap: RgbaBitmap,
    reply: Sender<Result<Vec<ClassificationCandidate>>>,
}

/// Owns a [`FoodClassifier`] on a dedicated thread and runs requests one at a time.
pub struct ClassifierWorker {
    tx: Option<Sender<Request>>,
    handle: Option<thread::JoinHandle<()>>,
    backend: String,
}

impl ClassifierWorker {
    pub fn spawn(mut classifier: FoodClassifier, capacity: usize) -> Result<Self> {
        let backend = classifier.backend().to_string();
        let (tx, rx) = bounded::<Request>(capacity.max(1));
        let handle = thread::Builder::new()
            .name("meal-lens-classifier".into())
            .spawn(move || {
                for request in rx.iter() {
                    let result = classifier.classify(&request.bitmap);
                    if request.reply.send(result).is_err() {
                        log::warn!("Classification reply dropped; caller went away");
                    }
                }
                classifier.dispose();
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            backend,
        })
    }

    /// Blocks until the worker has classified `bitmap`.
    pub fn classify(&self, bitmap: RgbaBitmap) -> Result<Vec<ClassificationCandidate>> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Worker("classifier worker is shut down".into()))?;
        let (reply_tx, reply_rx) = bounded(1);
        tx.send(Request {
            bitmap,
            reply: reply_tx,
        })
        .map_err(|_| Error::Worker("classifier worker stopped".into()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::Worker("classifier worker exited before replying".into()))?
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Classifier worker panicked");
            }
        }
    }
}

impl Drop for ClassifierWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::fake_classifier;
    use std::sync::Arc;

    fn bitmap() -> RgbaBitmap {
        RgbaBitmap::new(2, 2, vec![200; 16])
    }

    #[test]
    fn worker_returns_same_ranking_as_direct_call() {
        let mut direct = fake_classifier(vec![0.5, 2.5, 1.0]);
        let expected = direct.classify(&bitmap()).unwrap();

        let worker = ClassifierWorker::spawn(fake_classifier(vec![0.5, 2.5, 1.0]), 4).unwrap();
        assert_eq!(worker.classify(bitmap()).unwrap(), expected);
        assert_eq!(worker.backend(), "cpu");
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let worker = Arc::new(ClassifierWorker::spawn(fake_classifier(vec![1.0, 2.0]), 1).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let worker = worker.clone();
                thread::spawn(move || worker.classify(bitmap()).unwrap())
            })
            .collect();
        for t in threads {
            let out = t.join().unwrap();
            assert_eq!(out[0].label, "dish 1");
        }
    }

    #[test]
    fn errors_are_forwarded_to_the_caller() {
        let worker = ClassifierWorker::spawn(fake_classifier(vec![1.0, 2.0]), 2).unwrap();
        let broken = RgbaBitmap::new(3, 3, Vec::new());
        assert!(matches!(worker.classify(broken), Err(Error::InvalidImage(_))));
        assert!(worker.classify(bitmap()).is_ok());
    }

    #[test]
    fn shut_down_worker_rejects_requests() {
        let mut worker = ClassifierWorker::spawn(fake_classifier(vec![1.0]), 1).unwrap();
        worker.shutdown();
        assert!(matches!(worker.classify(bitmap()), Err(Error::Worker(_))));
    }
}
