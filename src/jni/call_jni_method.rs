/// Call a function from the `JNIEnv` function table of `$env`.
macro_rules! call_jni_method {
    ($env:expr, $method:ident) => {
        {
            let raw_env = $env.raw_env();
            let jni_fn = ((**raw_env).$method).unwrap();
            jni_fn(raw_env)
        }
    };
    ($env:expr, $method:ident, $($argument:expr),*) => {
        {
            let raw_env = $env.raw_env();
            let jni_fn = ((**raw_env).$method).unwrap();
            jni_fn(raw_env, $($argument),*)
        }
    };
}

/// Call a function from the invocation table of the `JavaVM` behind `$vm`.
macro_rules! call_vm_method {
    ($vm:expr, $method:ident) => {
        {
            let raw_jvm = $vm.raw_jvm();
            let jni_fn = ((**raw_jvm).$method).unwrap();
            jni_fn(raw_jvm)
        }
    };
    ($vm:expr, $method:ident, $($argument:expr),*) => {
        {
            let raw_jvm = $vm.raw_jvm();
            let jni_fn = ((**raw_jvm).$method).unwrap();
            jni_fn(raw_jvm, $($argument),*)
        }
    };
}
