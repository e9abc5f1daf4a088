#[cfg(test)]
mod lifecycle {
    use rust_jni_bridge::testing::{FakeLauncher, FakeRuntime};
    use rust_jni_bridge::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn start_use_shutdown() {
        let runtime = Arc::new(FakeRuntime::new());
        let embedding = Embedding::global();
        let vm = embedding
            .start(
                &Configuration::new().with_classpath("app.jar"),
                &FakeLauncher::new(runtime.clone()),
            )
            .unwrap();
        assert!(embedding.is_started());
        assert_eq!(embedding.current(), Some(vm.clone()));
        assert_eq!(vm.configuration().classpath().len(), 1);

        let workers: Vec<_> = (0..4i32)
            .map(|index| {
                let vm = vm.clone();
                thread::spawn(move || {
                    let context = vm.attach().unwrap();
                    let reference = vm
                        .to_native(&context, &Value::from(index), &TypeDescriptor::object())
                        .unwrap()
                        .unwrap();
                    let value = vm
                        .to_host(&context, reference, &TypeDescriptor::object())
                        .unwrap();
                    vm.registry().release(reference);
                    vm.detach(context).unwrap();
                    value
                })
            })
            .collect();
        let values: Vec<Value> = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect();
        assert_eq!(values, (0..4i32).map(Value::from).collect::<Vec<_>>());
        assert_eq!(vm.stats().attached_threads, 0);

        let context = vm.attach().unwrap();
        let kept = vm
            .to_native(&context, &Value::from("kept"), &TypeDescriptor::string())
            .unwrap()
            .unwrap();
        match shutdown(vm.clone(), false) {
            Err(BridgeError::Shutdown(message)) => {
                assert!(message.contains("1 live references"), "{}", message)
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(vm.is_alive());
        vm.registry().release(kept);
        vm.detach(context).unwrap();
        shutdown(vm.clone(), false).unwrap();

        assert!(!vm.is_alive());
        assert!(!embedding.is_started());
        let stats = runtime.stats();
        assert!(stats.destroyed);
        assert_eq!(stats.attaches, stats.detaches);
        assert_eq!(stats.globals_created, stats.globals_deleted);
        assert_eq!(runtime.live_global_refs(), 0);

        match start(&Configuration::new()) {
            Err(BridgeError::AlreadyStarted) => {}
            other => panic!("unexpected result {:?}", other),
        }
        match vm.attach() {
            Err(BridgeError::VmShutDown) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
