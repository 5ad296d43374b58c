use crate::credential::Credential;
use crate::script::{ExecutionRequest, GoogleError, Operation, ScriptError, ScriptService};
use anyhow::Result;
use log::debug;
use serde_json::Value;
use std::io::Write;

/// Runs one fixed function of one script and reports the outcome.
pub struct Invoker {
    service: ScriptService,
    script_id: String,
    function: String,
}

impl Invoker {
    pub fn new(
        service: ScriptService,
        script_id: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Invoker {
            service,
            script_id: script_id.into(),
            function: function.into(),
        }
    }

    /// Issue the call and write the outcome to `out`.
    ///
    /// Errors reported by the API are written out and swallowed, only
    /// transport failures and unreadable responses are returned.
    pub async fn invoke<W: Write>(&self, credential: &Credential, out: &mut W) -> Result<()> {
        let request = ExecutionRequest::new(self.function.as_str(), credential.access_token.as_str());

        match self.service.run(&self.script_id, &request, credential).await {
            Ok(operation) => report_operation(&operation, out)?,
            Err(ScriptError::Api(error)) => report_api_error(&error, out)?,
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }
}

pub fn report_operation<W: Write>(operation: &Operation, out: &mut W) -> Result<()> {
    if !operation.done {
        writeln!(out, "Operation was not completed.")?;
        return Ok(());
    }

    if let Some(error) = &operation.error {
        writeln!(out, "Encountered Error {}: {}", error.code, error.message)?;
        for element in error.script_stack_trace() {
            debug!("\t{}: {}", element.function, element.line_number);
        }
        return Ok(());
    }

    match operation.result() {
        Some(Value::Object(folders)) => {
            writeln!(out, "List of child folders under your root folder:")?;
            for (id, name) in folders {
                writeln!(out, "\t{} ({})", display_value(name), id)?;
            }
        }
        Some(result) => {
            writeln!(out, "List of child folders under your root folder:")?;
            writeln!(out, "\t{}", display_value(result))?;
        }
        None => writeln!(out, "\tFunction had no errors, but returned no response!")?,
    }

    Ok(())
}

pub fn report_api_error<W: Write>(error: &GoogleError, out: &mut W) -> Result<()> {
    writeln!(out, "Error returned: {}", error.code)?;
    writeln!(out, "Error Stacktrace:")?;
    writeln!(out, "\t{}", error)?;
    for detail in &error.details {
        writeln!(out, "\t{}", detail)?;
    }
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
