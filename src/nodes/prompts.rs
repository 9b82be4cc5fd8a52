//! 各节点的 system prompt

use crate::tools::{planning_schema_json, review_schema_json, routing_schema_json, tool_call_schema_json, ToolExecutor};

pub const ROUTER_PROMPT: &str = "You are a smart router. Determine the user's intent.
Options:
- 'research': Deep dives, reports, complex plans.
- 'quick': Simple questions, chat, quick info.
- 'explain': If user asks \"how do you work\", \"explain your graph\", \"who are you\".
Output one of: 'research', 'quick', 'explain'.";

pub const REVIEWER_PROMPT: &str = "Review the Agent's answer.
Check for Accuracy, Completeness, Safety.
Pass/Fail.";

/// Explainer 的固定自述
pub const EXPLAIN_TEXT: &str = "I am the 'Meta-Agent', a research assistant built as a graph of cooperating nodes:
1. Router: decides whether your message needs a quick answer, a research run or an explanation.
2. Planner: decomposes research tasks into 3-5 concrete steps.
3. Executor: runs each step with reasoning and tools (web search, notes, calculator).
4. Validator: reviews every answer for accuracy, completeness and safety, and sends it back for revision when it falls short.
5. Human-in-the-Loop: sensitive actions such as saving notes wait for your approval before they run.";

pub fn router_prompt() -> String {
    format!(
        "{}\n\nRespond with JSON matching this schema:\n{}",
        ROUTER_PROMPT,
        routing_schema_json()
    )
}

pub fn planner_prompt(prefs: &str) -> String {
    format!(
        "You are a research planner.
Break down the request into 3-5 distinct, actionable steps.
{}
Each step should focus on a specific aspect.
Return a valid JSON list of strings, or JSON matching this schema:
{}",
        prefs,
        planning_schema_json()
    )
}

pub fn executor_prompt(step: &str, notes: &str, tools: &str) -> String {
    format!(
        "You are a Reasoning Research Agent.
Current Step: {}

Context / Research Notes:
{}

Instructions:
1. Explain your REASONING briefly (why you are choosing a tool or answering).
2. Then select a TOOL if needed.
3. If saving notes, use the 'save_to_notes' tool and specify a relevant TOPIC.
When the step is done, answer with the step result as plain text.

{}",
        step, notes, tools
    )
}

pub fn reporter_prompt(notes: &str, prefs: &str, request: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a technical writer. Create a final report based on the notes:
{}

{}
User Request: {}",
        notes, prefs, request
    );
    if let Some(feedback) = feedback {
        prompt.push_str("\n\nRevise the report to address this review:\n");
        prompt.push_str(feedback);
    }
    prompt
}

pub fn reviewer_prompt() -> String {
    format!(
        "{}\n\nRespond with JSON matching this schema (status is \"pass\" or \"fail\"):\n{}",
        REVIEWER_PROMPT,
        review_schema_json()
    )
}

pub fn chat_prompt(input: &str, prefs: &str, tools: &str) -> String {
    format!(
        "You are a helpful assistant.
User Input: {}
{}

Confidence Check:
- High confidence -> Answer.
- Low confidence -> Use Tools.

{}",
        input, prefs, tools
    )
}

/// 工具清单与调用格式，拼入 Executor / Chat 的 prompt
pub fn tools_block(tools: &ToolExecutor) -> String {
    let list = tools
        .tool_descriptions()
        .into_iter()
        .map(|(name, desc)| format!("- {}: {}", name, desc))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Available tools:\n{}\n\nTool parameters:\n{}\n\nTo call a tool, reply with JSON matching this schema:\n{}",
        list,
        tools.schema_json(),
        tool_call_schema_json()
    )
}
