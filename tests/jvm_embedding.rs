#![cfg(feature = "libjvm")]

#[cfg(test)]
mod jvm_embedding {
    use rust_jni_bridge::*;
    use std::thread;

    fn string_round_trip(vm: &VmHandle, context: &ThreadContext, text: &str) -> Value {
        let reference = vm
            .to_native(context, &Value::from(text), &TypeDescriptor::string())
            .unwrap()
            .unwrap();
        let value = vm
            .to_host(context, reference, &TypeDescriptor::object())
            .unwrap();
        vm.registry().release(reference);
        value
    }

    #[test]
    fn embedded_jvm() {
        let vm = start(&Configuration::new().with_option(JvmOption::CheckedJni)).unwrap();
        assert!(vm.is_owned());
        let context = vm.attach().unwrap();

        let text = "clef \u{1d11e} and \0";
        assert_eq!(string_round_trip(&vm, &context, text), Value::from(text));

        let numbers = Value::from(vec![1i64, -2, i64::max_value()]);
        let descriptor = TypeDescriptor::parse("[J").unwrap();
        let reference = vm
            .to_native(&context, &numbers, &descriptor)
            .unwrap()
            .unwrap();
        assert_eq!(vm.to_host(&context, reference, &descriptor).unwrap(), numbers);
        vm.registry().release(reference);

        let error = BridgeError::Host(
            HostError::new("bad argument")
                .with_class("java.lang.IllegalArgumentException")
                .with_cause(BridgeError::Host(HostError::new("root"))),
        );
        vm.exceptions().throw(&context, &error);
        let exception = match vm.check_pending(&context) {
            Err(BridgeError::Java(exception)) => exception,
            other => panic!("unexpected result {:?}", other),
        };
        assert_eq!(
            exception.to_string(),
            "java.lang.IllegalArgumentException: bad argument"
        );
        assert_eq!(exception.kind(), ExceptionKind::RuntimeException);
        assert_eq!(
            exception.cause().map(|cause| cause.to_string()),
            Some("java.lang.RuntimeException: root".to_owned())
        );
        drop(exception);

        let proxy = vm
            .register_proxy(
                &context,
                &["java.lang.Runnable"],
                MethodTable::new().method("run", |_, _| Ok(Value::Null)),
            )
            .unwrap();
        assert!(proxy
            .object()
            .is_instance_of(&context, "java.lang.Runnable")
            .unwrap());
        assert_eq!(vm.release_proxy(proxy), ReleaseOutcome::Released);

        let other = vm.clone();
        let value = thread::spawn(move || {
            let context = other.attach().unwrap();
            let value = string_round_trip(&other, &context, "from another thread");
            other.detach(context).unwrap();
            value
        })
        .join()
        .unwrap();
        assert_eq!(value, Value::from("from another thread"));

        assert_eq!(vm.stats().live_references, 0);
        vm.detach(context).unwrap();
        shutdown(vm, false).unwrap();
    }
}
